use hostvm_types::{EngineError, EngineState, ErrorKind};
use thiserror::Error;

pub type AudioResult<T> = Result<T, AudioError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    #[error("audio engine is {state}; cannot {op}")]
    InvalidState { state: EngineState, op: &'static str },

    #[error("block of {len} samples is not a whole number of {channels}-channel frames")]
    MisalignedBlock { len: usize, channels: u16 },

    #[error("unsupported audio format: {0}")]
    InvalidFormat(String),

    #[error("failed to open output device: {0}")]
    BackendInit(String),
}

impl EngineError for AudioError {
    fn kind(&self) -> ErrorKind {
        match self {
            AudioError::InvalidState { .. } => ErrorKind::InvalidState,
            AudioError::MisalignedBlock { .. } => ErrorKind::Capacity,
            AudioError::InvalidFormat(_) | AudioError::BackendInit(_) => ErrorKind::BackendInit,
        }
    }
}

use hostvm_types::{EngineError, EngineState, ErrorKind};
use thiserror::Error;

pub type GpuResult<T> = Result<T, GpuError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    #[error("gpu backend initialisation failed: {0}")]
    BackendInit(String),

    #[error("invalid surface size {width}x{height} (max dimension {max})")]
    InvalidSurfaceSize { width: u32, height: u32, max: u32 },

    #[error("render of {count} vertices needs {needed} floats but only {len} were supplied")]
    Capacity {
        count: usize,
        needed: usize,
        len: usize,
    },

    #[error("gpu engine is {state}; cannot {op}")]
    InvalidState { state: EngineState, op: &'static str },

    #[error("readback failed: {0}")]
    Readback(String),
}

impl EngineError for GpuError {
    fn kind(&self) -> ErrorKind {
        match self {
            GpuError::BackendInit(_) | GpuError::InvalidSurfaceSize { .. } => {
                ErrorKind::BackendInit
            }
            GpuError::Capacity { .. } => ErrorKind::Capacity,
            GpuError::InvalidState { .. } => ErrorKind::InvalidState,
            GpuError::Readback(_) => ErrorKind::Io,
        }
    }
}

use hostvm_mem::MemoryError;
use hostvm_types::{EngineError, EngineState, ErrorKind};
use thiserror::Error;

pub type CpuResult<T> = Result<T, CpuError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("program of {len} bytes exceeds guest memory of {size} bytes")]
    Capacity { len: usize, size: u64 },

    #[error("pc 0x{pc:x} out of bounds (guest memory size 0x{size:x})")]
    PcOutOfBounds { pc: u64, size: u64 },

    #[error("unknown opcode 0x{opcode:02x} at pc 0x{pc:x}")]
    UnknownOpcode { opcode: u8, pc: u64 },

    #[error("register index {index} out of range")]
    InvalidRegister { index: usize },

    #[error("cpu engine is {state}; cannot {op}")]
    InvalidState { state: EngineState, op: &'static str },

    #[error("guest memory: {0}")]
    Memory(#[from] MemoryError),

    #[error("failed to spawn cpu worker: {0}")]
    Spawn(String),
}

impl EngineError for CpuError {
    fn kind(&self) -> ErrorKind {
        match self {
            CpuError::Capacity { .. } | CpuError::Memory(_) => ErrorKind::Capacity,
            CpuError::PcOutOfBounds { .. } => ErrorKind::PcOutOfBounds,
            CpuError::UnknownOpcode { .. } => ErrorKind::UnknownOpcode,
            CpuError::InvalidRegister { .. } | CpuError::InvalidState { .. } => {
                ErrorKind::InvalidState
            }
            CpuError::Spawn(_) => ErrorKind::Io,
        }
    }
}

use hostvm_types::{EngineError, ErrorKind};
use thiserror::Error;

pub type MemoryResult<T> = Result<T, MemoryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("guest memory access out of range: addr=0x{addr:x} len={len} size=0x{size:x}")]
    OutOfRange { addr: u64, len: usize, size: u64 },

    #[error("guest memory size {size} does not fit in usize")]
    SizeTooLarge { size: u64 },

    #[error("failed to allocate {size} bytes of guest memory")]
    AllocationFailed { size: u64 },

    #[error("invalid guest memory chunk size {chunk_size}")]
    InvalidChunkSize { chunk_size: usize },
}

impl EngineError for MemoryError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Capacity
    }
}

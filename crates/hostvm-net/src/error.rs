use std::io;

use hostvm_types::{EngineError, EngineState, ErrorKind};
use thiserror::Error;

use crate::ConnectionId;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to build reactor runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("failed to spawn reactor thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("network engine is {state}; cannot {op}")]
    InvalidState { state: EngineState, op: &'static str },
}

impl EngineError for NetError {
    fn kind(&self) -> ErrorKind {
        match self {
            NetError::Bind { .. } | NetError::Runtime(_) | NetError::Spawn(_) => ErrorKind::BackendInit,
            NetError::UnknownConnection(_) => ErrorKind::UnknownConnection,
            NetError::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }
}

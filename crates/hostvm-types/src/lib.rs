//! Types shared by every hostvm engine.
//!
//! The engines are independent (no shared state, no shared locks), but they agree on two things:
//! the coarse lifecycle a host can observe ([`EngineState`]) and the failure taxonomy the host
//! bridge logs against ([`ErrorKind`]).

#![forbid(unsafe_code)]

use core::fmt;

use serde::{Deserialize, Serialize};

/// Coarse lifecycle shared by all engines.
///
/// Every engine rejects data operations while [`EngineState::Uninitialized`]. The audio engine's
/// `Playing` state maps onto [`EngineState::Running`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EngineState {
    #[default]
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

impl EngineState {
    pub fn is_initialized(self) -> bool {
        !matches!(self, EngineState::Uninitialized)
    }

    pub fn is_running(self) -> bool {
        matches!(self, EngineState::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initialized => "initialized",
            EngineState::Running => "running",
            EngineState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure taxonomy used across engine boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A program or buffer exceeds the memory/bounds allotted to it.
    Capacity,
    /// Resource acquisition failed while initialising a backend.
    BackendInit,
    /// The CPU fetched past the end of guest memory.
    PcOutOfBounds,
    /// The CPU decoded an opcode it does not implement.
    UnknownOpcode,
    /// A send targeted a connection id that is not in the table.
    UnknownConnection,
    /// Socket or device I/O failed.
    Io,
    /// The operation is not valid in the engine's current lifecycle state.
    InvalidState,
}

impl ErrorKind {
    /// Whether the affected engine stays usable after an error of this kind.
    ///
    /// `PcOutOfBounds` stops the CPU and `BackendInit` leaves the engine uninitialised; every
    /// other kind is local to the call that produced it.
    pub fn is_fatal_to_engine(self) -> bool {
        matches!(self, ErrorKind::PcOutOfBounds | ErrorKind::BackendInit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Capacity => "capacity",
            ErrorKind::BackendInit => "backend-init",
            ErrorKind::PcOutOfBounds => "pc-out-of-bounds",
            ErrorKind::UnknownOpcode => "unknown-opcode",
            ErrorKind::UnknownConnection => "unknown-connection",
            ErrorKind::Io => "io",
            ErrorKind::InvalidState => "invalid-state",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by every engine error so the host bridge can log a uniform kind.
pub trait EngineError: std::error::Error {
    fn kind(&self) -> ErrorKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_uninitialized() {
        assert_eq!(EngineState::default(), EngineState::Uninitialized);
        assert!(!EngineState::default().is_initialized());
        assert!(EngineState::Stopped.is_initialized());
        assert!(EngineState::Running.is_running());
    }

    #[test]
    fn state_roundtrips_through_json() {
        let json = serde_json::to_string(&EngineState::Running).unwrap();
        assert_eq!(json, "\"Running\"");
        let back: EngineState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EngineState::Running);
    }

    #[test]
    fn fatal_kinds() {
        assert!(ErrorKind::PcOutOfBounds.is_fatal_to_engine());
        assert!(ErrorKind::BackendInit.is_fatal_to_engine());
        assert!(!ErrorKind::UnknownOpcode.is_fatal_to_engine());
        assert!(!ErrorKind::UnknownConnection.is_fatal_to_engine());
        assert_eq!(ErrorKind::Io.to_string(), "io");
    }
}

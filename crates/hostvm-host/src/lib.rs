//! The host side of the emulator: one owner for all four engines.
//!
//! [`Host`] exposes the per-engine call surface a managed caller drives (every call reports a
//! plain success flag or an optional value and logs the failure detail) plus whole-emulator
//! orchestration ([`Host::boot`], [`Host::start`], [`Host::stop`], [`Host::shutdown`]).
//!
//! Each engine lives exactly once per `Host`; re-initialising an engine through the host replaces
//! the previous instance.

#![forbid(unsafe_code)]

mod config;
mod host;
mod report;

pub use config::{ConfigError, HostConfig};
pub use host::Host;

pub use hostvm_audio::{AudioConfig, AudioFormat, AudioSink, AudioStats, CaptureSink, Pacing};
pub use hostvm_cpu::{CpuConfig, CpuState, RunExit};
pub use hostvm_gpu::{GpuBackendKind, GpuConfig, DEFAULT_TRIANGLE};
pub use hostvm_mem::MemoryBacking;
pub use hostvm_net::{ConnectionHandler, ConnectionId, ConnectionInfo, NetConfig};
pub use hostvm_types::{EngineState, ErrorKind};

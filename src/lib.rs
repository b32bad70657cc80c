//! hostvm: a native host for a toy virtual machine.
//!
//! The engines live in their own crates and are re-exported here:
//!
//! - [`cpu`]: fetch/decode/execute over guest memory on worker threads.
//! - [`gpu`]: offscreen triangle rendering into an RGBA8 colour buffer.
//! - [`audio`]: a FIFO of interleaved S16 blocks fed to a clocked output device.
//! - [`net`]: a polling TCP endpoint with per-connection send queues.
//! - [`host`]: the [`Host`] bridge that owns one of each.

#![forbid(unsafe_code)]

pub use hostvm_audio as audio;
pub use hostvm_cpu as cpu;
pub use hostvm_gpu as gpu;
pub use hostvm_host as host;
pub use hostvm_mem as mem;
pub use hostvm_net as net;
pub use hostvm_types as types;

pub use hostvm_host::{Host, HostConfig};
pub use hostvm_types::{EngineError, EngineState, ErrorKind};

//! CPU instruction engine.
//!
//! The engine runs a fetch/decode/execute loop over a [`hostvm_mem::MemoryBus`]. Instructions are
//! 32-bit little-endian words laid out as `opcode | rd | rn | rm` from the most significant byte
//! down (see [`Instruction`]).
//!
//! Execution is always a single logical instruction stream: however many workers the engine
//! is configured with, they retire instructions one at a time, in program order, under one lock.

#![forbid(unsafe_code)]

mod decode;
mod engine;
mod error;
mod state;

pub use decode::{assemble, Instruction, Opcode, INSTRUCTION_BYTES};
pub use engine::{CpuConfig, CpuEngine, RunExit};
pub use error::{CpuError, CpuResult};
pub use state::{CpuState, NUM_REGISTERS};

//! Guest memory for the hostvm CPU engine.
//!
//! [`MemoryBus`] is the flat, byte-addressable region the CPU fetches from. It sits on top of a
//! [`GuestMemory`] backend: [`DenseMemory`] commits the whole region up front, [`SparseMemory`]
//! allocates fixed-size chunks on first write so large guests do not reserve host memory they
//! never touch.
//!
//! Every access is bounds-checked. An access with `offset + len > size` fails with
//! [`MemoryError::OutOfRange`]; nothing is ever truncated.

#![forbid(unsafe_code)]

mod bus;
mod error;
mod phys;

pub use bus::MemoryBus;
pub use error::{MemoryError, MemoryResult};
pub use phys::{DenseMemory, GuestMemory, MemoryBacking, SparseMemory};

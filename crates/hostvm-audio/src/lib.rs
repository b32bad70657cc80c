//! Streaming PCM output engine.
//!
//! [`AudioEngine`] keeps a FIFO of signed 16-bit interleaved sample blocks. An output device
//! running on its own thread pulls the next block through a refill callback whenever it has
//! finished playing the current one. The FIFO and the current block sit behind one mutex that
//! both `queue_audio` and the refill callback take.
//!
//! No host audio API is opened: [`ClockedDevice`] plays blocks at the configured pace and
//! forwards them to an [`AudioSink`].

#![forbid(unsafe_code)]

mod device;
mod engine;
mod error;
mod format;
mod sink;

pub use device::{ClockedDevice, OutputDevice, Pacing, RefillFn};
pub use engine::{AudioConfig, AudioEngine, AudioStats};
pub use error::{AudioError, AudioResult};
pub use format::AudioFormat;
pub use sink::{AudioSink, CaptureSink, NullSink};

use std::sync::{Arc, Mutex, PoisonError};

/// Destination of the samples an output device plays.
pub trait AudioSink: Send {
    /// Push interleaved samples (e.g. stereo: L0, R0, L1, R1, ...).
    fn push_interleaved_i16(&mut self, samples: &[i16]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn push_interleaved_i16(&mut self, _samples: &[i16]) {}
}

/// Records every played block. Clones share the same recording.
#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    blocks: Arc<Mutex<Vec<Vec<i16>>>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> Vec<Vec<i16>> {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Played blocks with all-zero (silence) blocks filtered out.
    pub fn audible_blocks(&self) -> Vec<Vec<i16>> {
        self.blocks()
            .into_iter()
            .filter(|b| b.iter().any(|s| *s != 0))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AudioSink for CaptureSink {
    fn push_interleaved_i16(&mut self, samples: &[i16]) {
        self.blocks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(samples.to_vec());
    }
}

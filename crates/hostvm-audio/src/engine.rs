use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hostvm_types::EngineState;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::device::{ClockedDevice, OutputDevice, Pacing, RefillFn};
use crate::{AudioError, AudioFormat, AudioResult, AudioSink, NullSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub format: AudioFormat,
    pub pacing: Pacing,
}

/// Counters maintained by the refill callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AudioStats {
    /// Blocks handed to the device by the refill callback, silence included.
    pub blocks_submitted: u64,
    /// Refills that found the queue empty and submitted a period of silence instead.
    pub underruns: u64,
    /// Blocks currently waiting in the queue.
    pub queued: usize,
}

struct Playback {
    queue: VecDeque<Arc<[i16]>>,
    current: Arc<[i16]>,
    silence: Arc<[i16]>,
    /// Cleared by `stop` under this lock; refills after that pop nothing.
    playing: bool,
    blocks_submitted: u64,
    underruns: u64,
}

impl Playback {
    fn new(format: &AudioFormat) -> Self {
        let silence: Arc<[i16]> = Arc::from(format.silence());
        Self {
            queue: VecDeque::new(),
            current: Arc::clone(&silence),
            silence,
            playing: false,
            blocks_submitted: 0,
            underruns: 0,
        }
    }

    /// Pops the next block, or falls back to silence when starved. `None` once stopped.
    fn refill(&mut self) -> Option<Arc<[i16]>> {
        if !self.playing {
            return None;
        }
        match self.queue.pop_front() {
            Some(block) => self.current = block,
            None => {
                self.underruns += 1;
                self.current = Arc::clone(&self.silence);
                trace!(underruns = self.underruns, "audio queue starved");
            }
        }
        self.blocks_submitted += 1;
        Some(Arc::clone(&self.current))
    }
}

type SharedPlayback = Arc<Mutex<Playback>>;

fn lock(playback: &Mutex<Playback>) -> MutexGuard<'_, Playback> {
    playback.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Stream {
    format: AudioFormat,
    playback: SharedPlayback,
    device: Box<dyn OutputDevice>,
}

/// PCM output engine: `Uninitialized -> Initialized -> Playing <-> Stopped`.
///
/// `Playing` is reported as [`EngineState::Running`].
pub struct AudioEngine {
    state: EngineState,
    stream: Option<Stream>,
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Uninitialized,
            stream: None,
        }
    }

    pub fn lifecycle(&self) -> EngineState {
        self.state
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.stream.as_ref().map(|s| s.format)
    }

    /// Opens a clocked output stream that discards what it plays.
    pub fn initialize(&mut self, config: &AudioConfig) -> AudioResult<()> {
        self.initialize_with_sink(config, Box::new(NullSink))
    }

    /// Opens a clocked output stream that forwards every played block to `sink`.
    ///
    /// Re-initialising tears the previous stream down first.
    pub fn initialize_with_sink(
        &mut self,
        config: &AudioConfig,
        sink: Box<dyn AudioSink>,
    ) -> AudioResult<()> {
        let format = config.format;
        let pacing = config.pacing;
        self.initialize_with_device(format, move |refill| {
            Ok(Box::new(ClockedDevice::open(format, pacing, sink, refill)?))
        })
    }

    /// Opens a stream on a caller-provided device. `open` receives the refill callback the device
    /// must call from its playback thread.
    pub fn initialize_with_device<F>(&mut self, format: AudioFormat, open: F) -> AudioResult<()>
    where
        F: FnOnce(RefillFn) -> AudioResult<Box<dyn OutputDevice>>,
    {
        self.cleanup();
        format.validate()?;

        let playback: SharedPlayback = Arc::new(Mutex::new(Playback::new(&format)));
        let refill_playback = Arc::clone(&playback);
        let refill: RefillFn = Arc::new(move || lock(&refill_playback).refill());
        let device = open(refill)?;

        self.stream = Some(Stream {
            format,
            playback,
            device,
        });
        self.state = EngineState::Initialized;
        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            period_samples = format.period_samples,
            "audio engine initialized"
        );
        Ok(())
    }

    fn stream_mut(&mut self, op: &'static str) -> AudioResult<&mut Stream> {
        let state = self.state;
        self.stream
            .as_mut()
            .ok_or(AudioError::InvalidState { state, op })
    }

    /// Starts playback, seeding the device with the current block. No-op while playing.
    pub fn play(&mut self) -> AudioResult<()> {
        if self.state.is_running() {
            return Ok(());
        }
        let stream = self.stream_mut("play")?;
        let seed = {
            let mut playback = lock(&stream.playback);
            playback.playing = true;
            Arc::clone(&playback.current)
        };
        stream.device.start(seed);
        self.state = EngineState::Running;
        info!("audio playback started");
        Ok(())
    }

    /// Stops playback and discards all buffered audio.
    ///
    /// No queued block is handed to the device after this returns. A block the device already
    /// pulled may still finish playing.
    pub fn stop(&mut self) -> AudioResult<()> {
        let stream = self.stream_mut("stop")?;
        stream.device.pause();
        stream.device.flush();
        let dropped = {
            let mut playback = lock(&stream.playback);
            playback.playing = false;
            let dropped = playback.queue.len();
            playback.queue.clear();
            playback.current = Arc::clone(&playback.silence);
            dropped
        };
        self.state = EngineState::Stopped;
        info!(dropped_blocks = dropped, "audio playback stopped");
        Ok(())
    }

    /// Appends a copy of `samples` to the playback queue. Empty blocks are ignored.
    pub fn queue_audio(&mut self, samples: &[i16]) -> AudioResult<()> {
        let stream = self.stream_mut("queue audio")?;
        if samples.is_empty() {
            return Ok(());
        }
        let channels = stream.format.channels;
        if samples.len() % channels as usize != 0 {
            return Err(AudioError::MisalignedBlock {
                len: samples.len(),
                channels,
            });
        }

        let block: Arc<[i16]> = Arc::from(samples);
        let queued = {
            let mut playback = lock(&stream.playback);
            playback.queue.push_back(block);
            playback.queue.len()
        };
        debug!(samples = samples.len(), queued, "audio block queued");
        Ok(())
    }

    pub fn stats(&self) -> AudioStats {
        self.stream.as_ref().map_or_else(AudioStats::default, |s| {
            let playback = lock(&s.playback);
            AudioStats {
                blocks_submitted: playback.blocks_submitted,
                underruns: playback.underruns,
                queued: playback.queue.len(),
            }
        })
    }

    /// Closes the stream from any state. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        if let Some(stream) = self.stream.take() {
            // Dropping the device joins its thread; no refill runs after this.
            drop(stream);
            info!("audio engine cleaned up");
        }
        self.state = EngineState::Uninitialized;
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.cleanup();
    }
}

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace};

use crate::{AudioError, AudioFormat, AudioResult, AudioSink};

/// Called on the device thread each time the current block has finished playing; returns the
/// next block to play, or `None` once playback has been stopped.
pub type RefillFn = Arc<dyn Fn() -> Option<Arc<[i16]>> + Send + Sync>;

/// An output stream that plays blocks on its own thread.
pub trait OutputDevice: Send {
    /// Starts (or resumes) playback with `seed` as the first block.
    fn start(&mut self, seed: Arc<[i16]>);

    /// Stops pulling new blocks. The block in flight finishes playing.
    fn pause(&mut self);

    /// Drops a seed block that has not started playing yet.
    fn flush(&mut self);
}

/// How fast a [`ClockedDevice`] consumes blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Each block takes as long as it would on real hardware at the stream's sample rate.
    #[default]
    RealTime,
    /// Each block takes a fixed number of milliseconds regardless of its length.
    FixedMillis(u64),
}

impl Pacing {
    fn block_duration(self, format: &AudioFormat, samples: usize) -> Duration {
        match self {
            Pacing::RealTime => format.duration_of(samples),
            Pacing::FixedMillis(ms) => Duration::from_millis(ms),
        }
    }
}

#[derive(Default)]
struct DeviceState {
    playing: bool,
    seed: Option<Arc<[i16]>>,
    shutdown: bool,
}

struct DeviceShared {
    state: Mutex<DeviceState>,
    wake: Condvar,
}

impl DeviceShared {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Output device that stands in for a hardware callback thread.
///
/// A dedicated thread plays one block per period: it forwards the block to the sink, waits for
/// the block's duration and then asks the refill callback for the next one. The refill callback
/// is never invoked with the device lock held.
pub struct ClockedDevice {
    shared: Arc<DeviceShared>,
    thread: Option<JoinHandle<()>>,
}

impl ClockedDevice {
    pub fn open(
        format: AudioFormat,
        pacing: Pacing,
        sink: Box<dyn AudioSink>,
        refill: RefillFn,
    ) -> AudioResult<Self> {
        format.validate()?;

        let shared = Arc::new(DeviceShared {
            state: Mutex::new(DeviceState::default()),
            wake: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("hostvm-audio-device".into())
            .spawn(move || device_loop(thread_shared, format, pacing, sink, refill))
            .map_err(|err| AudioError::BackendInit(err.to_string()))?;

        debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            ?pacing,
            "audio device opened"
        );
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }
}

impl OutputDevice for ClockedDevice {
    fn start(&mut self, seed: Arc<[i16]>) {
        let mut state = self.shared.lock();
        state.seed = Some(seed);
        state.playing = true;
        self.shared.wake.notify_all();
    }

    fn pause(&mut self) {
        self.shared.lock().playing = false;
    }

    fn flush(&mut self) {
        self.shared.lock().seed = None;
    }
}

impl Drop for ClockedDevice {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.playing = false;
            self.shared.wake.notify_all();
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("audio device thread panicked");
            }
        }
        debug!("audio device closed");
    }
}

fn device_loop(
    shared: Arc<DeviceShared>,
    format: AudioFormat,
    pacing: Pacing,
    mut sink: Box<dyn AudioSink>,
    refill: RefillFn,
) {
    loop {
        let seed = {
            let mut state = shared.lock();
            while !state.playing && !state.shutdown {
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if state.shutdown {
                break;
            }
            state.seed.take()
        };

        let block = match seed {
            Some(block) => block,
            None => match refill() {
                Some(block) => block,
                // Stopped between the playing check and the refill; wait for the next start.
                None => continue,
            },
        };

        trace!(samples = block.len(), "audio block played");
        sink.push_interleaved_i16(&block);

        // Sleep on the condvar so shutdown does not wait out a whole period.
        let period = pacing.block_duration(&format, block.len());
        let state = shared.lock();
        let (state, _) = shared
            .wake
            .wait_timeout_while(state, period, |s| !s.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
        if state.shutdown {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn seed_plays_first_then_refill_is_pulled() {
        let calls = Arc::new(AtomicUsize::new(0));
        let refill_calls = Arc::clone(&calls);
        let refill: RefillFn = Arc::new(move || {
            refill_calls.fetch_add(1, Ordering::SeqCst);
            Some(Arc::from(vec![7i16; 4]))
        });
        let sink = CaptureSink::new();
        let mut device = ClockedDevice::open(
            AudioFormat::default(),
            Pacing::FixedMillis(1),
            Box::new(sink.clone()),
            refill,
        )
        .unwrap();

        device.start(Arc::from(vec![1i16, 2]));
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.len() < 3 {
            assert!(Instant::now() < deadline, "device never played three blocks");
            std::thread::sleep(Duration::from_millis(1));
        }
        device.pause();

        let blocks = sink.blocks();
        assert_eq!(blocks[0], vec![1, 2]);
        assert_eq!(blocks[1], vec![7; 4]);
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn drop_interrupts_a_long_period() {
        let refill: RefillFn = Arc::new(|| Some(Arc::from(vec![0i16; 2])));
        let mut device = ClockedDevice::open(
            AudioFormat::default(),
            Pacing::FixedMillis(60_000),
            Box::new(crate::NullSink),
            refill,
        )
        .unwrap();
        device.start(Arc::from(vec![0i16; 2]));
        std::thread::sleep(Duration::from_millis(5));

        let started = Instant::now();
        drop(device);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

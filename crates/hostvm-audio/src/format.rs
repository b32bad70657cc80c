use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AudioError, AudioResult};

/// Stream format. Samples are always signed 16-bit, interleaved by channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples per device period; also the size of the silence block played on
    /// starvation.
    pub period_samples: usize,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            period_samples: 4096,
        }
    }
}

impl AudioFormat {
    pub fn validate(&self) -> AudioResult<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::InvalidFormat("sample rate must be non-zero".into()));
        }
        if self.channels == 0 {
            return Err(AudioError::InvalidFormat("channel count must be non-zero".into()));
        }
        if self.period_samples == 0 || self.period_samples % self.channels as usize != 0 {
            return Err(AudioError::InvalidFormat(format!(
                "period of {} samples is not a whole number of {}-channel frames",
                self.period_samples, self.channels
            )));
        }
        Ok(())
    }

    /// Wall-clock time it takes to play `samples` interleaved samples.
    pub fn duration_of(&self, samples: usize) -> Duration {
        let frames = (samples / self.channels.max(1) as usize) as u64;
        Duration::from_nanos(frames * 1_000_000_000 / self.sample_rate.max(1) as u64)
    }

    pub fn silence(&self) -> Vec<i16> {
        vec![0; self.period_samples]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_period_is_about_46ms() {
        let format = AudioFormat::default();
        format.validate().unwrap();
        // 4096 stereo samples = 2048 frames at 44.1 kHz.
        assert_eq!(format.duration_of(4096).as_micros(), 46_439);
    }

    #[test]
    fn rejects_misaligned_period() {
        let format = AudioFormat {
            channels: 3,
            period_samples: 4096,
            ..AudioFormat::default()
        };
        assert!(format.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let format: AudioFormat = serde_json::from_str(r#"{ "channels": 1 }"#).unwrap();
        assert_eq!(format.channels, 1);
        assert_eq!(format.sample_rate, 44_100);
        assert_eq!(format.period_samples, 4096);
    }
}

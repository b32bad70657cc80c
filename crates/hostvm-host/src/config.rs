use std::path::{Path, PathBuf};

use hostvm_audio::AudioConfig;
use hostvm_cpu::CpuConfig;
use hostvm_gpu::GpuConfig;
use hostvm_net::NetConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for every engine. Missing sections and fields take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub cpu: CpuConfig,
    pub gpu: GpuConfig,
    pub audio: AudioConfig,
    pub net: NetConfig,
}

impl HostConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn to_json_pretty(&self) -> String {
        // Every field is a plain number, string or enum; serialisation cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hostvm_audio::Pacing;
    use hostvm_gpu::GpuBackendKind;
    use hostvm_mem::MemoryBacking;

    #[test]
    fn defaults_match_the_reference_device() {
        let config = HostConfig::default();
        assert_eq!(config.cpu.memory_size, 512 * 1024 * 1024);
        assert_eq!(config.cpu.memory_backing, MemoryBacking::Sparse);
        assert_eq!((config.gpu.width, config.gpu.height), (1920, 1080));
        assert_eq!(config.audio.format.sample_rate, 44_100);
        assert_eq!(config.audio.format.channels, 2);
        assert_eq!(config.audio.format.period_samples, 4096);
        assert_eq!(config.net.port, 5555);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = HostConfig::from_json(
            r#"{
                "cpu": { "memory_size": 4096, "memory_backing": "dense" },
                "gpu": { "backend": "software", "width": 64 },
                "audio": { "pacing": { "fixed_millis": 2 } },
                "net": { "port": 0 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.cpu.memory_size, 4096);
        assert_eq!(config.cpu.memory_backing, MemoryBacking::Dense);
        assert_eq!(config.cpu.workers, 1);
        assert_eq!(config.gpu.backend, GpuBackendKind::Software);
        assert_eq!((config.gpu.width, config.gpu.height), (64, 1080));
        assert_eq!(config.audio.pacing, Pacing::FixedMillis(2));
        assert_eq!(config.net.port, 0);
        assert_eq!(config.net.max_connections, 1024);
    }

    #[test]
    fn json_roundtrip() {
        let config = HostConfig::default();
        let back = HostConfig::from_json(&config.to_json_pretty()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn unknown_json_is_an_error() {
        assert!(matches!(
            HostConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}

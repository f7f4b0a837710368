//! Application configuration
//!
//! Loaded from `config.toml` in the platform configuration directory, or from an
//! explicit path. Every section falls back to defaults when absent.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub synth: SynthConfig,
    pub capture: CaptureConfig,
    pub log: LogConfig,
}

/// Output stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    /// Ring buffer between the synthesis tick and the device, in milliseconds
    pub ring_capacity_ms: u32,
    /// Samples retained for the oscilloscope feed
    pub scope_capacity: usize,
    /// Output device name, default device when unset
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            ring_capacity_ms: DEFAULT_RING_CAPACITY_MS,
            scope_capacity: DEFAULT_SCOPE_CAPACITY,
            device: None,
        }
    }
}

impl AudioConfig {
    /// Ring buffer capacity in samples
    pub fn ring_capacity_samples(&self) -> usize {
        (self.sample_rate as usize * self.ring_capacity_ms as usize) / 1000
    }
}

/// Tone synthesis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub tick_ms: u32,
    pub decay_per_sample: f32,
    pub inaudible_floor: f32,
    pub limiter_ceiling: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            decay_per_sample: DEFAULT_DECAY_PER_SAMPLE,
            inaudible_floor: DEFAULT_INAUDIBLE_FLOOR,
            limiter_ceiling: DEFAULT_LIMITER_CEILING,
        }
    }
}

impl SynthConfig {
    /// Samples produced by one mix tick at the given sample rate
    pub fn samples_per_tick(&self, sample_rate: u32) -> usize {
        (sample_rate as usize * self.tick_ms as usize) / 1000
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.tick_ms))
    }
}

/// Capture settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Skip probing and always use the demo generator
    pub force_demo: bool,
    /// Preferred live-capture interface (name or description)
    pub interface: Option<String>,
    pub promiscuous: bool,
    /// Live capture poll timeout
    pub poll_timeout_ms: u32,
    /// Raw socket read timeout, bounds how quickly the loop observes a stop
    pub raw_read_timeout_ms: u32,
    /// Address used to discover the outward-facing local address
    pub local_addr_probe: String,
    pub demo_min_interval_ms: u64,
    pub demo_max_interval_ms: u64,
    /// Demo RNG seed, random when unset
    pub demo_seed: Option<u64>,
    pub stop_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            force_demo: false,
            interface: None,
            promiscuous: true,
            poll_timeout_ms: 250,
            raw_read_timeout_ms: 200,
            local_addr_probe: LOCAL_ADDR_PROBE_TARGET.to_owned(),
            demo_min_interval_ms: 50,
            demo_max_interval_ms: 250,
            demo_seed: None,
            stop_timeout_ms: STOP_TIMEOUT.as_millis() as u64,
        }
    }
}

impl CaptureConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl AppConfig {
    /// Default location of the configuration file
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("", "", "packet-sonifier")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` (or the default location), falling back to defaults when
    /// no file exists
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Ok(path) => path,
                Err(_) => return Ok(Self::default()),
            },
        };

        if path.exists() {
            tracing::debug!(path = %path.display(), "Loading configuration");
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        let write_err = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(path, text).map_err(write_err)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_owned()));

        if self.audio.sample_rate == 0 {
            return invalid("audio.sample_rate must be positive");
        }
        if self.synth.tick_ms == 0 {
            return invalid("synth.tick_ms must be positive");
        }
        if !(self.synth.decay_per_sample > 0.0 && self.synth.decay_per_sample < 1.0) {
            return invalid("synth.decay_per_sample must be in (0, 1)");
        }
        if !(self.synth.limiter_ceiling > 0.0 && self.synth.limiter_ceiling <= 1.0) {
            return invalid("synth.limiter_ceiling must be in (0, 1]");
        }
        if self.synth.inaudible_floor < 0.0 {
            return invalid("synth.inaudible_floor must not be negative");
        }
        if self.capture.demo_min_interval_ms > self.capture.demo_max_interval_ms {
            return invalid("capture.demo_min_interval_ms exceeds demo_max_interval_ms");
        }
        if self.audio.ring_capacity_samples() < self.synth.samples_per_tick(self.audio.sample_rate) {
            return invalid("audio.ring_capacity_ms must hold at least one synthesis tick");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.audio.sample_rate, 44100);
        assert_eq!(config.synth.samples_per_tick(44100), 882);
        assert_eq!(config.audio.ring_capacity_samples(), 11025);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [synth]
            tick_ms = 10

            [capture]
            force_demo = true
            "#,
        )
        .unwrap();

        assert_eq!(config.synth.tick_ms, 10);
        assert_eq!(config.synth.limiter_ceiling, DEFAULT_LIMITER_CEILING);
        assert!(config.capture.force_demo);
        assert_eq!(config.capture.demo_max_interval_ms, 250);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.synth.decay_per_sample = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.capture.demo_min_interval_ms = 500;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.ring_capacity_ms = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = AppConfig::default();
        config.capture.demo_seed = Some(7);
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::defaults;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
}

/// Audio capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; None selects the first loopback candidate,
    /// falling back to the system default.
    pub device: Option<String>,
    pub sample_rate: u32,
    /// Capture ring buffer size in seconds.
    pub buffer_seconds: u32,
    /// Minimum buffered seconds before a chunk goes to inference.
    pub min_chunk_seconds: f64,
}

/// Transcription configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub model: String,
    pub language: String,
    /// Prefer a GPU device for the engine when available.
    pub use_gpu: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            buffer_seconds: defaults::BUFFER_SECONDS,
            min_chunk_seconds: defaults::MIN_CHUNK_SECONDS,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            use_gpu: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults only when
    /// the file is missing. Invalid TOML is reported as an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXLOG_MODEL → transcription.model
    /// - VOXLOG_LANGUAGE → transcription.language
    /// - VOXLOG_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VOXLOG_MODEL")
            && !model.is_empty()
        {
            self.transcription.model = model;
        }
        if let Ok(language) = std::env::var("VOXLOG_LANGUAGE")
            && !language.is_empty()
        {
            self.transcription.language = language;
        }
        if let Ok(device) = std::env::var("VOXLOG_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }
        self
    }

    /// Validate configuration values that the pipeline depends on.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(crate::error::VoxlogError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.min_chunk_seconds <= 0.0 {
            return Err(crate::error::VoxlogError::ConfigInvalidValue {
                key: "audio.min_chunk_seconds".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if (self.audio.buffer_seconds as f64) < self.audio.min_chunk_seconds {
            return Err(crate::error::VoxlogError::ConfigInvalidValue {
                key: "audio.buffer_seconds".to_string(),
                message: format!(
                    "must be at least min_chunk_seconds ({})",
                    self.audio.min_chunk_seconds
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.buffer_seconds, 10);
        assert_eq!(config.audio.min_chunk_seconds, 5.0);
        assert_eq!(config.transcription.model, "base");
        assert_eq!(config.transcription.language, "ja");
        assert!(!config.transcription.use_gpu);
    }

    #[test]
    fn load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[audio]
device = "Stereo Mix"
sample_rate = 16000
buffer_seconds = 20
min_chunk_seconds = 3.0

[transcription]
model = "medium"
language = "en"
use_gpu = true
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.audio.device.as_deref(), Some("Stereo Mix"));
        assert_eq!(config.audio.buffer_seconds, 20);
        assert_eq!(config.transcription.model, "medium");
        assert_eq!(config.transcription.language, "en");
        assert!(config.transcription.use_gpu);
    }

    #[test]
    fn load_partial_config_uses_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[transcription]\nlanguage = \"en\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.transcription.language, "en");
        assert_eq!(config.transcription.model, "base");
        assert_eq!(config.audio.sample_rate, 16000);
    }

    #[test]
    fn load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/voxlog.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn load_or_default_invalid_toml_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not = valid = toml").unwrap();
        assert!(Config::load_or_default(file.path()).is_err());
    }

    #[test]
    fn validate_rejects_zero_sample_rate() {
        let mut config = Config::default();
        config.audio.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_buffer_smaller_than_chunk() {
        let mut config = Config::default();
        config.audio.buffer_seconds = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }
}

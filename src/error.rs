//! Error types for voxlog.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxlogError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio capture errors
    #[error("Audio device unavailable: {device}")]
    DeviceUnavailable { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Engine asset / load errors
    #[error("Engine asset missing at {path}: {message}")]
    EngineAssetMissing { path: String, message: String },

    #[error("Engine load failed: {message}")]
    EngineLoadFailure { message: String },

    // Per-chunk transcription errors (non-fatal, the chunk is dropped)
    #[error("Transcription failed: {message}")]
    TranscriptionFailure { message: String },

    // Chunk dropped because the audio queue stayed full
    #[error("Audio queue full, dropped chunk of {duration_secs:.1}s")]
    QueueOverflow { duration_secs: f64 },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxlogError>;

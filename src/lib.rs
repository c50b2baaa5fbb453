//! voxlog - Offline voice transcription logger
//!
//! Continuously captures system/microphone audio, feeds accumulated chunks
//! to a speech-recognition engine, and streams back time-stamped text
//! segments, while managing the asynchronous lifecycle of loading that
//! engine.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod stt;

// Capture
pub use audio::capture::CaptureBuffer;

// Pipeline
pub use pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use pipeline::sink::{CollectorSink, SegmentSink, StdoutSink};
pub use pipeline::types::{AudioChunk, EngineOutput, Segment};

// Model lifecycle
pub use models::lifecycle::{LoadPhase, ModelLifecycle, ModelLoadState};

// Engine seams
pub use stt::engine::{ComputeDevice, EngineHandle, Precision, SpeechEngine};

// Error handling
pub use error::{Result, VoxlogError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when the git hash is available, `"0.1.0"`
/// otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

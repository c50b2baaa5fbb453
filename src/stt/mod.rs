//! Speech-to-text engine abstraction and implementations.

pub mod engine;
pub mod whisper;

pub use engine::{ComputeDevice, EngineHandle, MockEngine, Precision, SpeechEngine};
pub use whisper::WhisperEngine;

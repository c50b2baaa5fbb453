//! Speech-recognition engine abstraction.
//!
//! The engine is an external capability: asset verification, loading, and
//! per-chunk transcription. Implementations: [`MockEngine`] for tests and
//! `WhisperEngine` behind the `whisper` feature.

use crate::error::{Result, VoxlogError};
use crate::pipeline::types::{EngineOutput, Segment};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Compute device requested for engine loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Cuda,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "cpu"),
            ComputeDevice::Cuda => write!(f, "cuda"),
        }
    }
}

/// Numeric precision requested for engine loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Int8,
    Float16,
    Float32,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Int8 => write!(f, "int8"),
            Precision::Float16 => write!(f, "float16"),
            Precision::Float32 => write!(f, "float32"),
        }
    }
}

/// The lower-resource combination used when a GPU load fails.
pub const FALLBACK: (ComputeDevice, Precision) = (ComputeDevice::Cpu, Precision::Int8);

/// Factory side of the engine: asset verification and loading.
pub trait SpeechEngine: Send + Sync {
    /// Checks that the model assets at `path` exist and look intact.
    /// Performs no loading.
    fn verify(&self, path: &Path) -> Result<()>;

    /// Loads the engine. May take many seconds and may fail.
    fn load(
        &self,
        path: &Path,
        device: ComputeDevice,
        precision: Precision,
    ) -> Result<Arc<dyn EngineHandle>>;
}

/// A loaded engine ready for synchronous transcription.
pub trait EngineHandle: Send + Sync {
    /// Transcribes mono f32 samples. Synchronous; may take seconds.
    fn transcribe(&self, samples: &[f32], language: &str) -> Result<EngineOutput>;

    /// Whether the handle is usable. Checked by the lifecycle timeout guard.
    fn is_ready(&self) -> bool;
}

/// Mock engine for tests.
///
/// Builder-configurable delays and failures for verify/load, plus a
/// template of fragments the handle returns per chunk.
#[derive(Clone, Default)]
pub struct MockEngine {
    verify_error: Option<String>,
    load_error: Option<String>,
    /// When set, loading fails only for this device (fallback testing).
    fail_device: Option<ComputeDevice>,
    verify_delay: Duration,
    load_delay: Duration,
    response: Vec<Segment>,
    /// When set, the loaded handle fails every transcribe call.
    transcribe_error: bool,
    load_calls: Arc<AtomicU64>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `verify` fail with the given message.
    pub fn with_verify_failure(mut self, message: &str) -> Self {
        self.verify_error = Some(message.to_string());
        self
    }

    /// Makes `load` fail with the given message.
    pub fn with_load_failure(mut self, message: &str) -> Self {
        self.load_error = Some(message.to_string());
        self
    }

    /// Makes `load` fail only when asked for `device`.
    pub fn with_device_failure(mut self, device: ComputeDevice) -> Self {
        self.fail_device = Some(device);
        self
    }

    pub fn with_verify_delay(mut self, delay: Duration) -> Self {
        self.verify_delay = delay;
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Fragments the loaded handle returns for every chunk.
    pub fn with_response(mut self, segments: Vec<Segment>) -> Self {
        self.response = segments;
        self
    }

    /// Makes every transcribe call on the loaded handle fail.
    pub fn with_transcribe_failure(mut self) -> Self {
        self.transcribe_error = true;
        self
    }

    /// Number of `load` invocations so far (counts fallback retries).
    pub fn load_call_count(&self) -> u64 {
        self.load_calls.load(Ordering::SeqCst)
    }
}

impl SpeechEngine for MockEngine {
    fn verify(&self, path: &Path) -> Result<()> {
        if !self.verify_delay.is_zero() {
            std::thread::sleep(self.verify_delay);
        }
        if let Some(message) = &self.verify_error {
            return Err(VoxlogError::EngineAssetMissing {
                path: path.display().to_string(),
                message: message.clone(),
            });
        }
        Ok(())
    }

    fn load(
        &self,
        _path: &Path,
        device: ComputeDevice,
        _precision: Precision,
    ) -> Result<Arc<dyn EngineHandle>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        if let Some(message) = &self.load_error {
            return Err(VoxlogError::EngineLoadFailure {
                message: message.clone(),
            });
        }
        if self.fail_device == Some(device) {
            return Err(VoxlogError::EngineLoadFailure {
                message: format!("mock load failure on {}", device),
            });
        }
        Ok(Arc::new(MockHandle {
            response: self.response.clone(),
            fail: AtomicBool::new(self.transcribe_error),
            ready: AtomicBool::new(true),
        }))
    }
}

/// Handle produced by [`MockEngine`].
pub struct MockHandle {
    response: Vec<Segment>,
    fail: AtomicBool,
    ready: AtomicBool,
}

impl MockHandle {
    /// Standalone handle for tests that bypass the engine factory.
    pub fn with_response(segments: Vec<Segment>) -> Arc<Self> {
        Arc::new(Self {
            response: segments,
            fail: AtomicBool::new(false),
            ready: AtomicBool::new(true),
        })
    }

    /// Standalone handle whose transcribe always fails.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            response: Vec::new(),
            fail: AtomicBool::new(true),
            ready: AtomicBool::new(true),
        })
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }
}

impl EngineHandle for MockHandle {
    fn transcribe(&self, samples: &[f32], language: &str) -> Result<EngineOutput> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(VoxlogError::TranscriptionFailure {
                message: "mock transcription failure".to_string(),
            });
        }
        Ok(EngineOutput {
            segments: self.response.clone(),
            language: language.to_string(),
            duration_secs: samples.len() as f64 / crate::defaults::SAMPLE_RATE as f64,
        })
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn mock_verify_succeeds_by_default() {
        let engine = MockEngine::new();
        assert!(engine.verify(Path::new("/models/base")).is_ok());
    }

    #[test]
    fn mock_verify_failure_reports_asset_missing() {
        let engine = MockEngine::new().with_verify_failure("config.json missing");
        let result = engine.verify(Path::new("/models/base"));
        match result {
            Err(VoxlogError::EngineAssetMissing { path, message }) => {
                assert_eq!(path, "/models/base");
                assert_eq!(message, "config.json missing");
            }
            other => panic!("Expected EngineAssetMissing, got {:?}", other.err()),
        }
    }

    #[test]
    fn mock_load_returns_ready_handle() {
        let engine = MockEngine::new();
        let handle = engine
            .load(
                &PathBuf::from("/models/base"),
                ComputeDevice::Cpu,
                Precision::Int8,
            )
            .unwrap();
        assert!(handle.is_ready());
        assert_eq!(engine.load_call_count(), 1);
    }

    #[test]
    fn mock_device_failure_only_hits_that_device() {
        let engine = MockEngine::new().with_device_failure(ComputeDevice::Cuda);
        assert!(
            engine
                .load(
                    Path::new("/m"),
                    ComputeDevice::Cuda,
                    Precision::Float16
                )
                .is_err()
        );
        assert!(
            engine
                .load(Path::new("/m"), ComputeDevice::Cpu, Precision::Int8)
                .is_ok()
        );
        assert_eq!(engine.load_call_count(), 2);
    }

    #[test]
    fn mock_handle_returns_configured_segments() {
        let handle =
            MockHandle::with_response(vec![Segment::new(1, 0.0, 1.0, "hello", -0.2)]);
        let output = handle.transcribe(&vec![0.0; 16000], "en").unwrap();
        assert_eq!(output.segments.len(), 1);
        assert_eq!(output.segments[0].text, "hello");
        assert_eq!(output.language, "en");
        assert!((output.duration_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn failing_handle_reports_transcription_failure() {
        let handle = MockHandle::failing();
        let result = handle.transcribe(&[0.0; 100], "ja");
        assert!(matches!(
            result,
            Err(VoxlogError::TranscriptionFailure { .. })
        ));
    }

    #[test]
    fn device_and_precision_display() {
        assert_eq!(ComputeDevice::Cpu.to_string(), "cpu");
        assert_eq!(ComputeDevice::Cuda.to_string(), "cuda");
        assert_eq!(Precision::Int8.to_string(), "int8");
        assert_eq!(Precision::Float16.to_string(), "float16");
    }

    #[test]
    fn traits_are_object_safe() {
        fn _engine(_: &dyn SpeechEngine) {}
        fn _handle(_: &dyn EngineHandle) {}
    }
}

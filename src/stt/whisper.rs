//! Whisper implementation of the speech engine using whisper-rs.
//!
//! # Feature Gate
//!
//! The real engine requires the `whisper` feature (and cmake to build).
//! Without it, a stub is compiled whose `load` explains how to enable the
//! feature; `verify` works in both builds since it only inspects assets.
//!
//! ```bash
//! cargo build --features whisper
//! ```

use crate::error::{Result, VoxlogError};
use crate::stt::engine::{ComputeDevice, EngineHandle, Precision, SpeechEngine};
use std::path::Path;
use std::sync::Arc;
#[cfg(feature = "whisper")]
use tracing::info;

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters,
    install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Language value that lets the engine detect the spoken language.
pub const AUTO_LANGUAGE: &str = "auto";

/// Whisper-backed [`SpeechEngine`].
#[derive(Debug, Clone, Default)]
pub struct WhisperEngine {
    /// Inference thread count (None = whisper.cpp default).
    threads: Option<usize>,
}

impl WhisperEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Asset check shared by both builds: the model file must exist and
    /// be non-empty. No loading happens here.
    fn verify_assets(path: &Path) -> Result<()> {
        let metadata =
            std::fs::metadata(path).map_err(|e| VoxlogError::EngineAssetMissing {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if !metadata.is_file() {
            return Err(VoxlogError::EngineAssetMissing {
                path: path.display().to_string(),
                message: "not a regular file".to_string(),
            });
        }
        if metadata.len() == 0 {
            return Err(VoxlogError::EngineAssetMissing {
                path: path.display().to_string(),
                message: "model file is empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(feature = "whisper")]
impl SpeechEngine for WhisperEngine {
    fn verify(&self, path: &Path) -> Result<()> {
        Self::verify_assets(path)
    }

    fn load(
        &self,
        path: &Path,
        device: ComputeDevice,
        precision: Precision,
    ) -> Result<Arc<dyn EngineHandle>> {
        // Suppress whisper.cpp output (only once)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        Self::verify_assets(path)?;

        if device == ComputeDevice::Cuda && !cfg!(feature = "cuda") {
            return Err(VoxlogError::EngineLoadFailure {
                message: "built without CUDA support (enable the `cuda` feature)".to_string(),
            });
        }

        // ggml files fix their own quantisation; precision is recorded for
        // diagnostics only
        info!(path = %path.display(), %device, %precision, "loading whisper model");

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(device == ComputeDevice::Cuda);
        context_params.flash_attn(true);

        let context = WhisperContext::new_with_params(
            path.to_str().ok_or_else(|| VoxlogError::EngineLoadFailure {
                message: "Invalid UTF-8 in model path".to_string(),
            })?,
            context_params,
        )
        .map_err(|e| VoxlogError::EngineLoadFailure {
            message: format!("Failed to load Whisper model: {}", e),
        })?;

        Ok(Arc::new(WhisperHandle {
            context: Mutex::new(context),
            threads: self.threads,
        }))
    }
}

#[cfg(not(feature = "whisper"))]
impl SpeechEngine for WhisperEngine {
    fn verify(&self, path: &Path) -> Result<()> {
        Self::verify_assets(path)
    }

    fn load(
        &self,
        _path: &Path,
        _device: ComputeDevice,
        _precision: Precision,
    ) -> Result<Arc<dyn EngineHandle>> {
        Err(VoxlogError::EngineLoadFailure {
            message: concat!(
                "Whisper feature not enabled. This binary was built without speech recognition.\n",
                "To fix: cargo build --features whisper\n",
                "If the build fails with cmake errors, install: sudo apt install cmake"
            )
            .to_string(),
        })
    }
}

/// A loaded whisper context ready for transcription.
///
/// The context is wrapped in a Mutex; transcription is serialized, which
/// matches the single inference worker.
#[cfg(feature = "whisper")]
pub struct WhisperHandle {
    context: Mutex<WhisperContext>,
    threads: Option<usize>,
}

#[cfg(feature = "whisper")]
impl EngineHandle for WhisperHandle {
    fn transcribe(
        &self,
        samples: &[f32],
        language: &str,
    ) -> Result<crate::pipeline::types::EngineOutput> {
        use crate::pipeline::types::{EngineOutput, Segment};

        let duration_secs = samples.len() as f64 / crate::defaults::SAMPLE_RATE as f64;
        if duration_secs < 0.1 {
            // Too short for the model to say anything useful
            return Ok(EngineOutput {
                segments: Vec::new(),
                language: language.to_string(),
                duration_secs,
            });
        }

        let context = self
            .context
            .lock()
            .map_err(|e| VoxlogError::TranscriptionFailure {
                message: format!("Failed to acquire context lock: {}", e),
            })?;

        let mut state = context
            .create_state()
            .map_err(|e| VoxlogError::TranscriptionFailure {
                message: format!("Failed to create Whisper state: {}", e),
            })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        if language == AUTO_LANGUAGE {
            params.set_language(None);
        } else {
            params.set_language(Some(language));
        }
        if let Some(threads) = self.threads {
            params.set_n_threads(threads as i32);
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| VoxlogError::TranscriptionFailure {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let lang_id = state.full_lang_id_from_state();
        let detected = whisper_rs::get_lang_str(lang_id)
            .unwrap_or(language)
            .to_string();

        let mut segments = Vec::new();
        for (index, segment) in state.as_iter().enumerate() {
            let text = segment.to_string().trim().to_string();
            if text.is_empty() {
                continue;
            }
            // Timestamps arrive in centiseconds. whisper-rs exposes the
            // speech probability per segment; log it so the confidence is
            // negative and log-scaled like an average log-probability.
            let speech_prob = (1.0 - segment.no_speech_probability()).clamp(1e-6, 1.0);
            segments.push(Segment {
                id: index as u64 + 1,
                start_secs: segment.start_timestamp() as f64 * 0.01,
                end_secs: segment.end_timestamp() as f64 * 0.01,
                text,
                confidence: speech_prob.ln(),
            });
        }

        Ok(EngineOutput {
            segments,
            language: detected,
            duration_secs,
        })
    }

    fn is_ready(&self) -> bool {
        true
    }
}

//! Inference worker: the single consumer of the audio chunk queue.
//!
//! This is the only context in the pipeline allowed to block for
//! multi-second durations (the synchronous engine call). Chunks that
//! arrive while the engine is not loaded are discarded — stale audio is
//! not worth replaying once the engine comes up.

use crate::defaults;
use crate::models::lifecycle::{LoadPhase, ModelLifecycle};
use crate::pipeline::types::{AudioChunk, Segment};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the inference worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Blocking-pop timeout so the stop flag is observed promptly.
    pub recv_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_millis(defaults::WORKER_RECV_TIMEOUT_MS),
        }
    }
}

/// Consumes audio chunks, runs the engine, emits offset-corrected fragments.
pub struct InferenceWorker {
    lifecycle: Arc<ModelLifecycle>,
    /// Live-selectable transcription language.
    language: Arc<RwLock<String>>,
    config: WorkerConfig,
}

impl InferenceWorker {
    pub fn new(lifecycle: Arc<ModelLifecycle>, language: Arc<RwLock<String>>) -> Self {
        Self {
            lifecycle,
            language,
            config: WorkerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    fn current_language(&self) -> String {
        match self.language.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Transcribes one chunk and returns its offset-corrected fragments.
    ///
    /// Returns `None` when the chunk is discarded: engine not loaded, or a
    /// per-chunk engine failure (logged, never retried).
    pub fn process_chunk(&self, chunk: AudioChunk) -> Option<Vec<Segment>> {
        let snapshot = self.lifecycle.snapshot();
        if snapshot.phase != LoadPhase::Loaded {
            warn!(
                phase = %snapshot.phase,
                duration_secs = chunk.duration_secs,
                "engine not loaded, discarding chunk"
            );
            return None;
        }
        let handle = snapshot.ready_handle()?;

        let language = self.current_language();
        debug!(
            duration_secs = chunk.duration_secs,
            offset_secs = chunk.offset_secs,
            %language,
            "transcribing chunk"
        );

        match handle.transcribe(&chunk.samples, &language) {
            Ok(output) => {
                let mut segments = output.segments;
                for segment in &mut segments {
                    segment.start_secs += chunk.offset_secs;
                    segment.end_secs += chunk.offset_secs;
                }
                Some(segments)
            }
            Err(e) => {
                warn!(error = %e, "transcription failed, chunk dropped");
                None
            }
        }
    }

    /// Consumer loop: runs until `running` clears or the queue disconnects.
    ///
    /// Each successful chunk posts its fragment batch to the unbounded
    /// result queue.
    pub fn run(
        self,
        rx: Receiver<AudioChunk>,
        tx: Sender<Vec<Segment>>,
        running: Arc<AtomicBool>,
    ) {
        while running.load(Ordering::SeqCst) {
            match rx.recv_timeout(self.config.recv_timeout) {
                Ok(chunk) => {
                    if let Some(segments) = self.process_chunk(chunk)
                        && !segments.is_empty()
                        && tx.send(segments).is_err()
                    {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

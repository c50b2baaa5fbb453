//! Pipeline wiring: capture buffer → extractor → audio queue → inference
//! worker → result queue → reconciler.
//!
//! The extractor and worker each run in their own thread, connected by a
//! bounded chunk queue (drop-on-full, capture is never blocked) and an
//! unbounded result queue (inference is always slower than the drain).
//! The reconciler stays on the presentation side and is driven through
//! [`PipelineHandle::poll_segments`].

use crate::audio::capture::CaptureBuffer;
use crate::defaults;
use crate::models::lifecycle::ModelLifecycle;
use crate::pipeline::extractor::{ChunkExtractor, ExtractorConfig};
use crate::pipeline::reconciler::SegmentReconciler;
use crate::pipeline::types::Segment;
use crate::pipeline::worker::{InferenceWorker, WorkerConfig};
use crossbeam_channel::{Receiver, bounded, unbounded};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub sample_rate: u32,
    /// Minimum buffered duration before a chunk is cut.
    pub min_chunk_seconds: f64,
    /// Capacity of the bounded audio chunk queue.
    pub audio_queue_capacity: usize,
    /// Extractor polling period.
    pub poll_interval: Duration,
    /// Bounded wait when pushing onto a full audio queue.
    pub push_timeout: Duration,
    /// Worker blocking-pop timeout.
    pub recv_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            min_chunk_seconds: defaults::MIN_CHUNK_SECONDS,
            audio_queue_capacity: defaults::AUDIO_QUEUE_CAPACITY,
            poll_interval: Duration::from_millis(defaults::EXTRACTOR_POLL_MS),
            push_timeout: Duration::from_millis(defaults::QUEUE_PUSH_TIMEOUT_MS),
            recv_timeout: Duration::from_millis(defaults::WORKER_RECV_TIMEOUT_MS),
        }
    }
}

/// Builds and starts the capture/inference pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    language: Arc<RwLock<String>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, language: Arc<RwLock<String>>) -> Self {
        Self { config, language }
    }

    /// Spawns the extractor and worker threads for one recording session.
    ///
    /// Offsets start at zero; the caller clears the capture buffer before
    /// starting a session if stale audio must not leak in.
    pub fn start(
        self,
        buffer: Arc<CaptureBuffer>,
        lifecycle: Arc<ModelLifecycle>,
    ) -> PipelineHandle {
        let running = Arc::new(AtomicBool::new(true));
        let (chunk_tx, chunk_rx) = bounded(self.config.audio_queue_capacity);
        let (result_tx, result_rx) = unbounded();

        let extractor = ChunkExtractor::new(
            buffer.clone(),
            ExtractorConfig {
                poll_interval: self.config.poll_interval,
                min_chunk_seconds: self.config.min_chunk_seconds,
                push_timeout: self.config.push_timeout,
                sample_rate: self.config.sample_rate,
            },
        );
        let dropped_chunks = extractor.dropped_counter();

        let worker = InferenceWorker::new(lifecycle, self.language.clone()).with_config(
            WorkerConfig {
                recv_timeout: self.config.recv_timeout,
            },
        );

        let mut threads = Vec::new();
        {
            let running = running.clone();
            threads.push(thread::spawn(move || extractor.run(chunk_tx, running)));
        }
        {
            let running = running.clone();
            threads.push(thread::spawn(move || {
                worker.run(chunk_rx, result_tx, running)
            }));
        }

        info!("pipeline started");
        PipelineHandle {
            running,
            threads,
            result_rx,
            reconciler: SegmentReconciler::new(self.language),
            buffer,
            dropped_chunks,
        }
    }
}

/// Handle to a running pipeline, owned by the presentation side.
pub struct PipelineHandle {
    running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
    result_rx: Receiver<Vec<Segment>>,
    reconciler: SegmentReconciler,
    buffer: Arc<CaptureBuffer>,
    dropped_chunks: Arc<AtomicU64>,
}

impl PipelineHandle {
    /// Drains available results through the reconciler.
    ///
    /// Called from the presentation-side periodic task (~500 ms). Returns
    /// the newly accepted segments.
    pub fn poll_segments(&mut self) -> Vec<Segment> {
        self.reconciler.drain(&self.result_rx)
    }

    /// Smoothed capture level in [0, 1].
    pub fn audio_level(&self) -> f32 {
        self.buffer.level()
    }

    /// Capture buffer fill ratio in [0, 1].
    pub fn buffer_fill(&self) -> f32 {
        self.buffer.fill_percentage()
    }

    /// Chunks dropped so far on audio-queue overflow.
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }

    /// Accepted segment history for this session.
    pub fn history(&self) -> &[Segment] {
        self.reconciler.history()
    }

    /// Clears the accepted history (explicit full reset).
    pub fn reset_history(&mut self) {
        self.reconciler.reset();
    }

    /// Returns true while the pipeline threads are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the pipeline and returns the complete accepted history.
    ///
    /// Signals the stop flag, joins both loops within a bounded grace
    /// period (detaching stragglers), then reconciles results that were
    /// already completed. Chunks still sitting in the audio queue are
    /// discarded with their channel.
    pub fn stop(mut self) -> Vec<Segment> {
        self.running.store(false, Ordering::SeqCst);

        let deadline = Instant::now() + Duration::from_secs(defaults::STOP_GRACE_SECS);
        let poll_interval = Duration::from_millis(50);

        loop {
            let mut remaining = Vec::new();
            for handle in self.threads.drain(..) {
                if handle.is_finished() {
                    if handle.join().is_err() {
                        warn!("pipeline thread panicked during shutdown");
                    }
                } else {
                    remaining.push(handle);
                }
            }
            self.threads = remaining;

            if self.threads.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                warn!(
                    threads = self.threads.len(),
                    "shutdown grace period elapsed, detaching threads"
                );
                break;
            }
            thread::sleep(poll_interval);
        }

        // Reconcile whatever inference already finished
        self.reconciler.drain(&self.result_rx);
        info!(segments = self.reconciler.history().len(), "pipeline stopped");
        self.reconciler.history().to_vec()
    }
}

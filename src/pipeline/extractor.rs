//! Chunk extractor: drains the capture buffer into offset-tagged chunks.
//!
//! Runs on a dedicated polling loop. Offset assignment and buffer clearing
//! are one logical operation from the pipeline's point of view: the buffer
//! drain and the offset stamp both happen inside `poll_once` before the
//! chunk is handed to the queue.

use crate::audio::capture::CaptureBuffer;
use crate::defaults;
use crate::error::VoxlogError;
use crate::pipeline::types::AudioChunk;
use crossbeam_channel::{SendTimeoutError, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the chunk extractor.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Polling period for `drain_if_ready`.
    pub poll_interval: Duration,
    /// Minimum buffered duration before a chunk is cut.
    pub min_chunk_seconds: f64,
    /// Bounded wait when the audio queue is full.
    pub push_timeout: Duration,
    /// Session sample rate.
    pub sample_rate: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(defaults::EXTRACTOR_POLL_MS),
            min_chunk_seconds: defaults::MIN_CHUNK_SECONDS,
            push_timeout: Duration::from_millis(defaults::QUEUE_PUSH_TIMEOUT_MS),
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

/// Drains the capture buffer and emits offset-tagged chunks.
///
/// The running offset starts at zero for each recording session and only
/// ever advances; it is owned here, not by the buffer.
pub struct ChunkExtractor {
    buffer: Arc<CaptureBuffer>,
    config: ExtractorConfig,
    offset_secs: f64,
    dropped: Arc<AtomicU64>,
}

impl ChunkExtractor {
    pub fn new(buffer: Arc<CaptureBuffer>, config: ExtractorConfig) -> Self {
        Self {
            buffer,
            config,
            offset_secs: 0.0,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of chunks dropped on queue overflow.
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }

    /// Current running offset in seconds.
    pub fn offset_secs(&self) -> f64 {
        self.offset_secs
    }

    /// Resets the running offset for a new recording session.
    pub fn reset(&mut self) {
        self.offset_secs = 0.0;
    }

    /// Minimum sample count required before a chunk is cut.
    fn min_samples(&self) -> usize {
        (self.config.min_chunk_seconds * self.config.sample_rate as f64) as usize
    }

    /// Attempts one drain; on success stamps the offset and advances it.
    pub fn poll_once(&mut self) -> Option<AudioChunk> {
        let samples = self.buffer.drain_if_ready(self.min_samples())?;
        let chunk = AudioChunk::new(samples, self.config.sample_rate, self.offset_secs);
        self.offset_secs += chunk.duration_secs;
        debug!(
            duration_secs = chunk.duration_secs,
            offset_secs = chunk.offset_secs,
            "chunk extracted"
        );
        Some(chunk)
    }

    /// Pushes a chunk with a bounded wait; drops it with a warning when the
    /// queue stays full. Capture is never blocked indefinitely.
    pub fn dispatch(&self, chunk: AudioChunk, tx: &Sender<AudioChunk>) {
        let duration_secs = chunk.duration_secs;
        match tx.send_timeout(chunk, self.config.push_timeout) {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("{}", VoxlogError::QueueOverflow { duration_secs });
            }
        }
    }

    /// Polling loop: runs until `running` clears or the queue disconnects.
    pub fn run(mut self, tx: Sender<AudioChunk>, running: Arc<AtomicBool>) {
        while running.load(Ordering::SeqCst) {
            if let Some(chunk) = self.poll_once() {
                self.dispatch(chunk, &tx);
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    fn test_config() -> ExtractorConfig {
        ExtractorConfig {
            poll_interval: Duration::from_millis(1),
            min_chunk_seconds: 1.0,
            push_timeout: Duration::from_millis(10),
            sample_rate: 1000,
        }
    }

    #[test]
    fn poll_returns_none_below_threshold() {
        let buffer = Arc::new(CaptureBuffer::new(1000, 10));
        let mut extractor = ChunkExtractor::new(buffer.clone(), test_config());

        buffer.push(&vec![0.1; 500]);
        assert!(extractor.poll_once().is_none());
        assert_eq!(buffer.len(), 500);
        assert_eq!(extractor.offset_secs(), 0.0);
    }

    #[test]
    fn poll_extracts_and_advances_offset() {
        let buffer = Arc::new(CaptureBuffer::new(1000, 10));
        let mut extractor = ChunkExtractor::new(buffer.clone(), test_config());

        buffer.push(&vec![0.1; 1500]);
        let chunk = extractor.poll_once().unwrap();
        assert_eq!(chunk.samples.len(), 1500);
        assert_eq!(chunk.offset_secs, 0.0);
        assert!((chunk.duration_secs - 1.5).abs() < 1e-9);
        assert!((extractor.offset_secs() - 1.5).abs() < 1e-9);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn offsets_are_strictly_non_decreasing() {
        let buffer = Arc::new(CaptureBuffer::new(1000, 10));
        let mut extractor = ChunkExtractor::new(buffer.clone(), test_config());

        let mut offsets = Vec::new();
        for _ in 0..5 {
            buffer.push(&vec![0.1; 1000]);
            let chunk = extractor.poll_once().unwrap();
            offsets.push(chunk.offset_secs);
        }

        for pair in offsets.windows(2) {
            assert!(pair[1] > pair[0], "offsets must advance: {:?}", offsets);
        }
        assert_eq!(offsets[0], 0.0);
    }

    #[test]
    fn reset_returns_offset_to_zero() {
        let buffer = Arc::new(CaptureBuffer::new(1000, 10));
        let mut extractor = ChunkExtractor::new(buffer.clone(), test_config());

        buffer.push(&vec![0.1; 1000]);
        extractor.poll_once().unwrap();
        assert!(extractor.offset_secs() > 0.0);

        extractor.reset();
        assert_eq!(extractor.offset_secs(), 0.0);
    }

    #[test]
    fn dispatch_delivers_to_queue() {
        let buffer = Arc::new(CaptureBuffer::new(1000, 10));
        let extractor = ChunkExtractor::new(buffer, test_config());
        let (tx, rx) = bounded(2);

        extractor.dispatch(AudioChunk::new(vec![0.1; 1000], 1000, 0.0), &tx);
        assert_eq!(rx.recv().unwrap().samples.len(), 1000);
        assert_eq!(extractor.dropped.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn dispatch_drops_when_queue_full() {
        let buffer = Arc::new(CaptureBuffer::new(1000, 10));
        let extractor = ChunkExtractor::new(buffer, test_config());
        let (tx, _rx) = bounded(1);

        extractor.dispatch(AudioChunk::new(vec![0.1; 1000], 1000, 0.0), &tx);
        extractor.dispatch(AudioChunk::new(vec![0.1; 1000], 1000, 1.0), &tx);

        assert_eq!(extractor.dropped.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn run_loop_extracts_until_stopped() {
        let buffer = Arc::new(CaptureBuffer::new(1000, 10));
        let extractor = ChunkExtractor::new(buffer.clone(), test_config());
        let (tx, rx) = bounded(16);
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let running = running.clone();
            std::thread::spawn(move || extractor.run(tx, running))
        };

        buffer.push(&vec![0.1; 1200]);
        let chunk = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(chunk.offset_secs, 0.0);

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
    }
}

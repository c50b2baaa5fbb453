//! Capture ring buffer shared between the audio driver callback and the
//! chunk extractor.
//!
//! The buffer is bounded: once `buffer_seconds × sample_rate` samples are
//! held, the oldest samples are evicted. `push` never blocks and never
//! fails — overflow loss is acceptable and observable through
//! `fill_percentage`. The audio level lives behind its own mutex so a slow
//! level reader can never stall a capture write.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::defaults;

/// Thread-safe ring buffer for mono f32 samples with an RMS level meter.
///
/// One writer (the driver callback), one drainer (the chunk extractor) and
/// any number of level readers may operate concurrently. The data lock and
/// the level lock are never held at the same time.
pub struct CaptureBuffer {
    samples: Mutex<VecDeque<f32>>,
    level: Mutex<f32>,
    capacity: usize,
    sample_rate: u32,
}

impl CaptureBuffer {
    /// Creates a buffer holding at most `buffer_seconds` of audio.
    pub fn new(sample_rate: u32, buffer_seconds: u32) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            level: Mutex::new(0.0),
            capacity: (sample_rate as usize) * (buffer_seconds as usize),
            sample_rate,
        }
    }

    /// Appends samples, evicting the oldest on overflow.
    ///
    /// Also updates the smoothed level meter from the RMS of this push.
    /// Called from the driver callback: no blocking waits, no errors.
    pub fn push(&self, incoming: &[f32]) {
        if incoming.is_empty() {
            return;
        }

        // RMS computed before taking any lock
        let rms = calculate_rms(incoming);

        {
            let mut buf = lock_unpoisoned(&self.samples);
            buf.extend(incoming.iter().copied());
            let len = buf.len();
            if len > self.capacity {
                buf.drain(..len - self.capacity);
            }
        }

        let scaled = (rms * defaults::LEVEL_SCALE).min(1.0);
        let mut level = lock_unpoisoned(&self.level);
        *level += (scaled - *level) * defaults::LEVEL_SMOOTHING;
    }

    /// Atomically takes and clears the buffer contents when at least
    /// `min_samples` are held; otherwise leaves the buffer untouched.
    pub fn drain_if_ready(&self, min_samples: usize) -> Option<Vec<f32>> {
        let mut buf = lock_unpoisoned(&self.samples);
        if buf.len() >= min_samples {
            Some(buf.drain(..).collect())
        } else {
            None
        }
    }

    /// Smoothed audio level of the most recent pushes, in [0, 1].
    pub fn level(&self) -> f32 {
        *lock_unpoisoned(&self.level)
    }

    /// Buffer fill ratio in [0, 1]. Reaching 1.0 means overflow eviction.
    pub fn fill_percentage(&self) -> f32 {
        let len = lock_unpoisoned(&self.samples).len();
        len as f32 / self.capacity as f32
    }

    /// Number of samples currently buffered.
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.samples).len()
    }

    /// Returns true when no samples are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards all buffered samples.
    pub fn clear(&self) {
        lock_unpoisoned(&self.samples).clear();
    }

    /// Maximum number of samples the buffer retains.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sample rate the buffer was created for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
/// Sample data stays structurally valid across any push/drain interruption.
fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Root-mean-square magnitude of a sample slice.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

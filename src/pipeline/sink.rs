//! Presentation seam for reconciled output.
//!
//! The pipeline core never calls into display state from its worker
//! threads; the presentation-side periodic drain invokes these callbacks
//! on its own context.

use crate::models::lifecycle::LoadPhase;
use crate::pipeline::types::Segment;
use std::sync::{Arc, Mutex};

/// Consumer of pipeline output on the presentation side.
pub trait SegmentSink: Send {
    /// Smoothed capture level in [0, 1], delivered on the level tick.
    fn on_level_update(&mut self, _level: f32) {}

    /// Newly accepted segments, in ascending start order.
    fn on_segments_appended(&mut self, segments: &[Segment]);

    /// Model lifecycle transition with a human-readable message.
    fn on_model_state_changed(&mut self, _phase: LoadPhase, _message: &str) {}
}

/// Collects everything it receives; for tests and batch runs.
#[derive(Default)]
pub struct CollectorSink {
    segments: Arc<Mutex<Vec<Segment>>>,
    levels: Vec<f32>,
    state_changes: Vec<(LoadPhase, String)>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the collected segments.
    pub fn segments(&self) -> Arc<Mutex<Vec<Segment>>> {
        self.segments.clone()
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn state_changes(&self) -> &[(LoadPhase, String)] {
        &self.state_changes
    }

    /// Concatenated text of all collected segments.
    pub fn text(&self) -> String {
        let segments = match self.segments.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl SegmentSink for CollectorSink {
    fn on_level_update(&mut self, level: f32) {
        self.levels.push(level);
    }

    fn on_segments_appended(&mut self, segments: &[Segment]) {
        let mut collected = match self.segments.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        collected.extend_from_slice(segments);
    }

    fn on_model_state_changed(&mut self, phase: LoadPhase, message: &str) {
        self.state_changes.push((phase, message.to_string()));
    }
}

/// Prints timestamped segments to stdout; the CLI display surface.
#[derive(Debug, Default)]
pub struct StdoutSink {
    show_confidence: bool,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_confidence(mut self) -> Self {
        self.show_confidence = true;
        self
    }
}

/// Formats a session-relative timestamp as HH:MM:SS.
fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

impl SegmentSink for StdoutSink {
    fn on_segments_appended(&mut self, segments: &[Segment]) {
        for segment in segments {
            if self.show_confidence {
                println!(
                    "[{}] {} ({:.2})",
                    format_timestamp(segment.start_secs),
                    segment.text,
                    segment.confidence
                );
            } else {
                println!("[{}] {}", format_timestamp(segment.start_secs), segment.text);
            }
        }
    }

    fn on_model_state_changed(&mut self, phase: LoadPhase, message: &str) {
        eprintln!("model: {} — {}", phase, message);
    }
}

//! Data types flowing through the transcription pipeline.

/// A bounded slice of captured audio handed to inference.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples at the session sample rate.
    pub samples: Vec<f32>,
    /// Chunk length in seconds.
    pub duration_secs: f64,
    /// Recording-relative start time of this chunk, assigned exactly once
    /// by the extractor.
    pub offset_secs: f64,
}

impl AudioChunk {
    /// Creates a chunk, deriving the duration from the sample count.
    pub fn new(samples: Vec<f32>, sample_rate: u32, offset_secs: f64) -> Self {
        let duration_secs = samples.len() as f64 / sample_rate as f64;
        Self {
            samples,
            duration_secs,
            offset_secs,
        }
    }
}

/// A timestamped unit of recognized text.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Sequential number within the accepted history.
    pub id: u64,
    /// Session-absolute start time in seconds.
    pub start_secs: f64,
    /// Session-absolute end time in seconds.
    pub end_secs: f64,
    pub text: String,
    /// Engine's average log-probability; unconstrained, typically negative.
    pub confidence: f32,
}

impl Segment {
    pub fn new(id: u64, start_secs: f64, end_secs: f64, text: &str, confidence: f32) -> Self {
        Self {
            id,
            start_secs,
            end_secs,
            text: text.to_string(),
            confidence,
        }
    }
}

/// Raw engine output for one chunk.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    /// Chunk-relative fragments as emitted by the engine.
    pub segments: Vec<Segment>,
    /// Language the engine recognized (or was told to use).
    pub language: String,
    /// Input audio duration in seconds.
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_duration_derived_from_sample_count() {
        let chunk = AudioChunk::new(vec![0.0; 80_000], 16_000, 12.5);
        assert!((chunk.duration_secs - 5.0).abs() < 1e-9);
        assert!((chunk.offset_secs - 12.5).abs() < 1e-9);
    }

    #[test]
    fn empty_chunk_has_zero_duration() {
        let chunk = AudioChunk::new(Vec::new(), 16_000, 0.0);
        assert_eq!(chunk.duration_secs, 0.0);
    }

    #[test]
    fn segment_construction() {
        let seg = Segment::new(1, 0.5, 2.0, "こんにちは", -0.3);
        assert_eq!(seg.id, 1);
        assert_eq!(seg.text, "こんにちは");
        assert!(seg.confidence < 0.0);
    }
}

//! Streaming capture/inference pipeline.
//!
//! ```text
//! ┌────────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌────────────┐
//! │ Driver │──▶│  Capture  │──▶│   Chunk   │──▶│ Inference │──▶│  Segment   │──▶ Sink
//! │callback│   │  Buffer   │   │ Extractor │   │  Worker   │   │ Reconciler │
//! └────────┘   └───────────┘   └───────────┘   └───────────┘   └────────────┘
//!                                    │ bounded queue   │ unbounded queue
//!                                    ▼                 ▼
//!                              drop on full      drained every 500 ms
//! ```
//!
//! The model lifecycle controller gates the inference worker: chunks are
//! discarded until the engine reports `Loaded`.

pub mod extractor;
pub mod orchestrator;
pub mod reconciler;
pub mod sink;
pub mod types;
pub mod worker;

pub use extractor::{ChunkExtractor, ExtractorConfig};
pub use orchestrator::{Pipeline, PipelineConfig, PipelineHandle};
pub use reconciler::{ReconcilerConfig, SegmentReconciler};
pub use sink::{CollectorSink, SegmentSink, StdoutSink};
pub use types::{AudioChunk, EngineOutput, Segment};
pub use worker::{InferenceWorker, WorkerConfig};

//! Model metadata and lifecycle management.

pub mod catalog;
pub mod lifecycle;

pub use catalog::{ModelInfo, default_model, get_model, list_models, resolve_model_path};
pub use lifecycle::{
    FailureKind, LifecycleError, LoadPhase, ModelLifecycle, ModelLoadState, StateChange,
};

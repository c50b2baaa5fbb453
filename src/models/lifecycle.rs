//! Model lifecycle controller.
//!
//! A generation-stamped state machine over
//! `Unloaded → Verifying → Verified → Loading → Loaded` with `Failed` as
//! the retryable error phase. Verify/load work runs on a private tokio
//! runtime so the capture and inference paths never wait on it.
//!
//! Background tasks are never cancelled; instead every task captures the
//! generation it was issued with and compares it against the current one
//! on completion. A stale task discards its own result without touching
//! state, which is what makes superseding requests (a load issued while a
//! verify is still running) safe.

use crate::error::VoxlogError;
use crate::stt::engine::{ComputeDevice, EngineHandle, FALLBACK, Precision, SpeechEngine};
use crossbeam_channel::Sender;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::defaults;

/// Phase of the model load state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Unloaded,
    Verifying,
    Verified,
    Loading,
    Loaded,
    Failed,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadPhase::Unloaded => "unloaded",
            LoadPhase::Verifying => "verifying",
            LoadPhase::Verified => "verified",
            LoadPhase::Loading => "loading",
            LoadPhase::Loaded => "loaded",
            LoadPhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Classification of a lifecycle failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AssetMissing,
    LoadFailure,
    Timeout,
}

/// Failure recorded in the lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleError {
    pub kind: FailureKind,
    pub message: String,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Point-in-time copy of the lifecycle state.
#[derive(Clone)]
pub struct ModelLoadState {
    pub generation: u64,
    pub phase: LoadPhase,
    pub handle: Option<Arc<dyn EngineHandle>>,
    pub last_error: Option<LifecycleError>,
}

impl ModelLoadState {
    /// The handle, present only when the phase is `Loaded`.
    pub fn ready_handle(&self) -> Option<Arc<dyn EngineHandle>> {
        if self.phase == LoadPhase::Loaded {
            self.handle.clone()
        } else {
            None
        }
    }
}

impl fmt::Debug for ModelLoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLoadState")
            .field("generation", &self.generation)
            .field("phase", &self.phase)
            .field("handle", &self.handle.as_ref().map(|_| "<EngineHandle>"))
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// State-change notification for the presentation side.
///
/// Delivered over a crossbeam channel and drained by the presentation's
/// periodic task; lifecycle tasks never call into presentation state.
#[derive(Debug, Clone)]
pub struct StateChange {
    pub generation: u64,
    pub phase: LoadPhase,
    pub message: String,
}

struct Inner {
    generation: u64,
    phase: LoadPhase,
    handle: Option<Arc<dyn EngineHandle>>,
    last_error: Option<LifecycleError>,
}

/// The process-wide model lifecycle controller.
pub struct ModelLifecycle {
    inner: Arc<Mutex<Inner>>,
    engine: Arc<dyn SpeechEngine>,
    /// Background execution context; Some until drop.
    runtime: Option<Runtime>,
    events: Option<Sender<StateChange>>,
    timeout: Duration,
}

impl Drop for ModelLifecycle {
    fn drop(&mut self) {
        // shutdown_background never blocks, so dropping the controller is
        // safe from async contexts too; residual tasks are detached.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl ModelLifecycle {
    /// Creates the controller around an engine implementation.
    pub fn new(engine: Arc<dyn SpeechEngine>) -> crate::error::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("model-lifecycle")
            .enable_all()
            .build()
            .map_err(VoxlogError::Io)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                generation: 0,
                phase: LoadPhase::Unloaded,
                handle: None,
                last_error: None,
            })),
            engine,
            runtime: Some(runtime),
            events: None,
            timeout: Duration::from_secs(defaults::MODEL_TIMEOUT_SECS),
        })
    }

    /// Spawns a task on the background execution context.
    fn spawn(&self, future: impl std::future::Future<Output = ()> + Send + 'static) {
        if let Some(runtime) = &self.runtime {
            runtime.spawn(future);
        }
    }

    /// Publishes state changes on the given channel.
    pub fn with_events(mut self, events: Sender<StateChange>) -> Self {
        self.events = Some(events);
        self
    }

    /// Overrides the timeout guard duration.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Starts asset verification for a new generation.
    ///
    /// Returns the generation assigned to this request.
    pub fn request_verify(&self, model_path: impl Into<PathBuf>) -> u64 {
        let path = model_path.into();
        let generation = self.begin(LoadPhase::Verifying, "verifying model assets");

        let inner = self.inner.clone();
        let engine = self.engine.clone();
        let events = self.events.clone();
        self.spawn(async move {
            let verify_path = path.clone();
            let result =
                tokio::task::spawn_blocking(move || engine.verify(&verify_path)).await;
            let outcome = flatten_task(result);

            let mut st = lock_unpoisoned(&inner);
            if st.generation != generation {
                debug!(generation, "discarding stale verify result");
                return;
            }
            match outcome {
                Ok(()) => {
                    st.phase = LoadPhase::Verified;
                    drop(st);
                    info!(path = %path.display(), "model assets verified");
                    emit(&events, generation, LoadPhase::Verified, "model assets verified");
                }
                Err(e) => {
                    let error = LifecycleError {
                        kind: FailureKind::AssetMissing,
                        message: e.to_string(),
                    };
                    st.phase = LoadPhase::Failed;
                    st.last_error = Some(error.clone());
                    drop(st);
                    warn!(path = %path.display(), error = %error, "model verification failed");
                    emit(&events, generation, LoadPhase::Failed, &error.message);
                }
            }
        });

        self.spawn_timeout_guard(generation);
        generation
    }

    /// Starts an engine load for a new generation.
    ///
    /// A load requested while a verify (or an older load) is in flight
    /// supersedes it: the old generation's completion becomes a no-op.
    /// A failed load on a non-CPU device retries once with the CPU/Int8
    /// fallback before reporting failure.
    ///
    /// Returns the generation assigned to this request.
    pub fn request_load(
        &self,
        model_path: impl Into<PathBuf>,
        device: ComputeDevice,
        precision: Precision,
    ) -> u64 {
        let path = model_path.into();
        let generation = self.begin(
            LoadPhase::Loading,
            &format!("loading model ({}/{})", device, precision),
        );

        let inner = self.inner.clone();
        let engine = self.engine.clone();
        let events = self.events.clone();
        self.spawn(async move {
            let load_path = path.clone();
            let result = tokio::task::spawn_blocking(move || {
                match engine.load(&load_path, device, precision) {
                    Ok(handle) => Ok(handle),
                    Err(first) if device != FALLBACK.0 => {
                        warn!(
                            error = %first,
                            "engine load failed on {}, retrying with {}/{}",
                            device, FALLBACK.0, FALLBACK.1
                        );
                        engine.load(&load_path, FALLBACK.0, FALLBACK.1)
                    }
                    Err(first) => Err(first),
                }
            })
            .await;
            let outcome = flatten_task(result);

            let mut st = lock_unpoisoned(&inner);
            if st.generation != generation {
                debug!(generation, "discarding stale load result");
                return;
            }
            match outcome {
                Ok(handle) => {
                    st.handle = Some(handle);
                    st.phase = LoadPhase::Loaded;
                    drop(st);
                    info!(path = %path.display(), "model loaded");
                    emit(&events, generation, LoadPhase::Loaded, "model loaded");
                }
                Err(e) => {
                    let error = LifecycleError {
                        kind: FailureKind::LoadFailure,
                        message: e.to_string(),
                    };
                    st.phase = LoadPhase::Failed;
                    st.last_error = Some(error.clone());
                    drop(st);
                    warn!(path = %path.display(), error = %error, "model load failed");
                    emit(&events, generation, LoadPhase::Failed, &error.message);
                }
            }
        });

        self.spawn_timeout_guard(generation);
        generation
    }

    /// Point-in-time copy of the state. Consumers never mutate directly.
    pub fn snapshot(&self) -> ModelLoadState {
        let st = lock_unpoisoned(&self.inner);
        ModelLoadState {
            generation: st.generation,
            phase: st.phase,
            handle: st.handle.clone(),
            last_error: st.last_error.clone(),
        }
    }

    /// Drops any loaded engine and returns to `Unloaded`.
    ///
    /// Bumps the generation so residual in-flight tasks are discarded.
    pub fn reset(&self) {
        let generation = {
            let mut st = lock_unpoisoned(&self.inner);
            st.generation += 1;
            st.phase = LoadPhase::Unloaded;
            st.handle = None;
            st.last_error = None;
            st.generation
        };
        emit(&self.events, generation, LoadPhase::Unloaded, "model state reset");
    }

    /// Bumps the generation and enters `phase`, invalidating older tasks.
    fn begin(&self, phase: LoadPhase, message: &str) -> u64 {
        let generation = {
            let mut st = lock_unpoisoned(&self.inner);
            st.generation += 1;
            st.phase = phase;
            st.last_error = None;
            st.generation
        };
        emit(&self.events, generation, phase, message);
        generation
    }

    /// Deferred check that fires only if `generation` is still current and
    /// the phase is still non-terminal. If the stored handle reports ready
    /// despite the bookkeeping, the guard reconciles to `Loaded`; otherwise
    /// it forces `Failed` so callers are never left waiting.
    fn spawn_timeout_guard(&self, generation: u64) {
        let inner = self.inner.clone();
        let events = self.events.clone();
        let timeout = self.timeout;
        self.spawn(async move {
            tokio::time::sleep(timeout).await;

            let mut st = lock_unpoisoned(&inner);
            if st.generation != generation {
                return;
            }
            if !matches!(st.phase, LoadPhase::Verifying | LoadPhase::Loading) {
                return;
            }

            if st.handle.as_ref().is_some_and(|h| h.is_ready()) {
                st.phase = LoadPhase::Loaded;
                drop(st);
                info!(generation, "engine already ready, reconciled after timeout");
                emit(
                    &events,
                    generation,
                    LoadPhase::Loaded,
                    "engine ready, reconciled after timeout",
                );
                return;
            }

            let error = LifecycleError {
                kind: FailureKind::Timeout,
                message: format!("model load timed out after {}s", timeout.as_secs()),
            };
            st.phase = LoadPhase::Failed;
            st.last_error = Some(error.clone());
            drop(st);
            warn!(generation, "model load timed out");
            emit(&events, generation, LoadPhase::Failed, &error.message);
        });
    }
}

fn emit(events: &Option<Sender<StateChange>>, generation: u64, phase: LoadPhase, message: &str) {
    if let Some(tx) = events {
        let _ = tx.send(StateChange {
            generation,
            phase,
            message: message.to_string(),
        });
    }
}

/// Collapses a spawn_blocking join result into the engine result.
fn flatten_task<T>(
    result: std::result::Result<crate::error::Result<T>, tokio::task::JoinError>,
) -> crate::error::Result<T> {
    match result {
        Ok(inner) => inner,
        Err(join_error) => Err(VoxlogError::Other(format!(
            "lifecycle task aborted: {}",
            join_error
        ))),
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

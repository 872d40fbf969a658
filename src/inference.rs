//! Generative backend abstraction and the per-strategy handle registry

use crate::{
    config::GenerationConfig,
    error::{Result, RoomcraftError},
    types::{GenerationRequest, RawOutput, Strategy},
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Trait for generative backends
///
/// One backend instance serves exactly one strategy and is never called
/// concurrently; `ModelHandle` serializes access.
pub trait GenerativeBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// # Errors
    /// - Model loading or connection setup failures
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &GenerationConfig) -> Result<Option<Duration>>;

    /// Run one generation call
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Device, runtime or transport failures
    fn infer(&mut self, request: &GenerationRequest) -> Result<RawOutput>;

    /// Whether this backend can serve the strategy
    fn supports(&self, strategy: Strategy) -> bool;

    /// Human-readable backend name for logs
    fn name(&self) -> &str;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Long-lived, exclusively locked handle around one initialized backend
pub struct ModelHandle {
    strategy: Strategy,
    backend_name: String,
    backend: Mutex<Box<dyn GenerativeBackend>>,
    invocations: AtomicU64,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("strategy", &self.strategy)
            .field("backend", &self.backend_name)
            .field("invocations", &self.invocations())
            .finish()
    }
}

impl ModelHandle {
    /// Initialize a backend and wrap it for one strategy
    ///
    /// # Errors
    /// Returns `RoomcraftError::ModelUnavailable` when the backend does not
    /// support the strategy or fails to initialize
    pub fn new(
        strategy: Strategy,
        mut backend: Box<dyn GenerativeBackend>,
        config: &GenerationConfig,
    ) -> Result<Self> {
        let backend_name = backend.name().to_string();
        if !backend.supports(strategy) {
            return Err(RoomcraftError::model_unavailable(format!(
                "backend '{}' does not support {}",
                backend_name, strategy
            )));
        }

        let init_time = backend.initialize(config).map_err(|e| {
            RoomcraftError::model_unavailable(format!(
                "{} backend '{}' failed to initialize: {}",
                strategy, backend_name, e
            ))
        })?;
        if let Some(duration) = init_time {
            log::info!(
                "Initialized {} backend '{}' in {:.2}ms",
                strategy,
                backend_name,
                duration.as_secs_f64() * 1000.0
            );
        }

        Ok(Self {
            strategy,
            backend_name,
            backend: Mutex::new(backend),
            invocations: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Number of inference calls that reached the backend
    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Blocking inference under the handle's exclusive lock
    ///
    /// The lock is held for the entire backend call and released on every
    /// exit path, including failure.
    ///
    /// # Errors
    /// - `InferenceFailure` for backend faults
    /// - `UnsupportedOutputShape` and `DimensionMismatch` pass through unchanged
    pub fn infer(&self, request: &GenerationRequest) -> Result<RawOutput> {
        if request.strategy != self.strategy {
            return Err(RoomcraftError::internal(format!(
                "{} request routed to the {} handle",
                request.strategy, self.strategy
            )));
        }

        // A panicked call fails only its own request; the backend stays in service
        let mut backend = self.backend.lock().unwrap_or_else(|poisoned| {
            log::warn!(
                "{} handle on '{}' was poisoned by an earlier panic, reusing the backend",
                self.strategy,
                self.backend_name
            );
            poisoned.into_inner()
        });

        let started = Instant::now();
        self.invocations.fetch_add(1, Ordering::Relaxed);
        let result = backend.infer(request);
        let elapsed = started.elapsed();
        drop(backend);

        match &result {
            Ok(raw) => log::debug!(
                "{} inference on '{}' returned {} in {:.2}ms",
                self.strategy,
                self.backend_name,
                raw.describe(),
                elapsed.as_secs_f64() * 1000.0
            ),
            Err(e) => log::warn!(
                "{} inference on '{}' failed after {:.2}ms: {}",
                self.strategy,
                self.backend_name,
                elapsed.as_secs_f64() * 1000.0,
                e
            ),
        }

        result.map_err(|e| match e {
            RoomcraftError::InferenceFailure(_)
            | RoomcraftError::UnsupportedOutputShape(_)
            | RoomcraftError::DimensionMismatch { .. } => e,
            other => RoomcraftError::inference(other.to_string()),
        })
    }

    /// Run [`ModelHandle::infer`] on the blocking thread pool
    ///
    /// If the awaiting future is dropped the call still runs to completion
    /// and its output is discarded.
    ///
    /// # Errors
    /// Same as [`ModelHandle::infer`], plus `InferenceFailure` when the
    /// blocking task panics
    pub async fn infer_blocking_task(
        self: &Arc<Self>,
        request: GenerationRequest,
    ) -> Result<RawOutput> {
        let handle = Arc::clone(self);
        tokio::task::spawn_blocking(move || handle.infer(&request))
            .await
            .map_err(|e| RoomcraftError::inference(format!("Inference task aborted: {}", e)))?
    }
}

/// Strategy → handle map, built once at startup and shared read-only
#[derive(Debug, Default)]
pub struct HandleRegistry {
    handles: HashMap<Strategy, Arc<ModelHandle>>,
}

impl HandleRegistry {
    #[must_use]
    pub fn builder() -> HandleRegistryBuilder {
        HandleRegistryBuilder::new()
    }

    /// Handle serving the strategy
    ///
    /// # Errors
    /// Returns `RoomcraftError::ModelUnavailable` when no handle is registered
    pub fn get(&self, strategy: Strategy) -> Result<Arc<ModelHandle>> {
        self.handles.get(&strategy).cloned().ok_or_else(|| {
            RoomcraftError::model_unavailable(format!("no model handle registered for {}", strategy))
        })
    }

    #[must_use]
    pub fn contains(&self, strategy: Strategy) -> bool {
        self.handles.contains_key(&strategy)
    }

    /// Registered strategies in a stable order
    #[must_use]
    pub fn strategies(&self) -> Vec<Strategy> {
        let mut strategies: Vec<Strategy> = self.handles.keys().copied().collect();
        strategies.sort();
        strategies
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Collects backends and initializes them into a `HandleRegistry`
#[derive(Default)]
pub struct HandleRegistryBuilder {
    pending: Vec<(Strategy, Box<dyn GenerativeBackend>)>,
}

impl HandleRegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend for a strategy; a later registration replaces an earlier one
    #[must_use]
    pub fn register(mut self, strategy: Strategy, backend: Box<dyn GenerativeBackend>) -> Self {
        self.pending.retain(|(existing, _)| *existing != strategy);
        self.pending.push((strategy, backend));
        self
    }

    /// Initialize every registered backend
    ///
    /// # Errors
    /// Returns `RoomcraftError::ModelUnavailable` for the first backend that
    /// cannot be initialized
    pub fn initialize(self, config: &GenerationConfig) -> Result<HandleRegistry> {
        let mut handles = HashMap::with_capacity(self.pending.len());
        for (strategy, backend) in self.pending {
            let _span =
                crate::tracing_config::spans::backend_startup(strategy.as_str(), backend.name())
                    .entered();
            let handle = ModelHandle::new(strategy, backend, config)?;
            handles.insert(strategy, Arc::new(handle));
        }
        log::info!("Model handles ready for {} strategies", handles.len());
        Ok(HandleRegistry { handles })
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use super::health::{HealthStatus, HealthTracker, Metrics};
use super::{Backend, Recognizer, Stage, Synthesizer, Translator};

/// Runtime binding of one backend to its health tracker.
///
/// Created once per distinct backend kind and stage; lives for the process.
pub struct BackendHandle<B: ?Sized> {
    backend: Arc<B>,
    kind: String,
    stage: Stage,
    timeout: Duration,
    health: HealthTracker,
}

impl<B: ?Sized + Backend> BackendHandle<B> {
    pub fn new(stage: Stage, backend: Arc<B>, timeout: Duration) -> Self {
        let kind = backend.kind().to_string();
        Self {
            backend,
            kind,
            stage,
            timeout,
            health: HealthTracker::new(),
        }
    }

    pub fn backend(&self) -> Arc<B> {
        Arc::clone(&self.backend)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Default per-call timeout, used when a plan does not set one.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn status(&self) -> HealthStatus {
        self.health.status()
    }

    pub fn metrics(&self) -> Metrics {
        self.health.metrics()
    }

    pub fn record_outcome(&self, latency: Duration, success: bool, error: Option<&str>) {
        self.health.record_outcome(latency, success, error);
    }

    pub fn info(&self) -> BackendInfo {
        let (status, metrics) = self.health.snapshot();
        BackendInfo {
            stage: self.stage,
            backend: self.kind.clone(),
            name: self.backend.name().to_string(),
            status,
            average_latency_ms: metrics.average_latency_ms(),
            metrics,
        }
    }
}

/// Serializable view of one backend for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BackendInfo {
    pub stage: Stage,
    pub backend: String,
    pub name: String,
    pub status: HealthStatus,
    pub average_latency_ms: Option<f64>,
    pub metrics: Metrics,
}

/// All backends registered for a single stage.
///
/// Written only during startup registration; read on every dispatch.
pub struct StageRegistry<B: ?Sized> {
    stage: Stage,
    handles: RwLock<BTreeMap<String, Arc<BackendHandle<B>>>>,
}

impl<B: ?Sized + Backend> StageRegistry<B> {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            handles: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Registers a backend. Returns `false` if one of the same kind already exists.
    pub fn register(&self, backend: Arc<B>, timeout: Duration) -> bool {
        let handle = BackendHandle::new(self.stage, backend, timeout);
        let mut handles = self.handles.write();
        if handles.contains_key(handle.kind()) {
            debug!(stage = %self.stage, backend = %handle.kind(), "Backend already registered, skipping");
            return false;
        }
        info!(stage = %self.stage, backend = %handle.kind(), ?timeout, "Backend registered");
        handles.insert(handle.kind().to_string(), Arc::new(handle));
        true
    }

    pub fn get(&self, kind: &str) -> Option<Arc<BackendHandle<B>>> {
        self.handles.read().get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handles.read().contains_key(kind)
    }

    pub fn handles(&self) -> Vec<Arc<BackendHandle<B>>> {
        self.handles.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.read().is_empty()
    }
}

/// Process-wide table of backend handles, one sub-registry per stage.
///
/// Not a singleton: every test can build its own instance.
pub struct BackendRegistry {
    pub recognizers: StageRegistry<dyn Recognizer>,
    pub translators: StageRegistry<dyn Translator>,
    pub synthesizers: StageRegistry<dyn Synthesizer>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            recognizers: StageRegistry::new(Stage::Recognition),
            translators: StageRegistry::new(Stage::Translation),
            synthesizers: StageRegistry::new(Stage::Synthesis),
        }
    }

    /// Whether `kind` is registered for `stage`.
    pub fn contains(&self, stage: Stage, kind: &str) -> bool {
        match stage {
            Stage::Recognition => self.recognizers.contains(kind),
            Stage::Translation => self.translators.contains(kind),
            Stage::Synthesis => self.synthesizers.contains(kind),
        }
    }

    /// Snapshot of every registered backend across all stages.
    pub fn infos(&self) -> Vec<BackendInfo> {
        let mut infos: Vec<BackendInfo> = self.recognizers.handles().iter().map(|h| h.info()).collect();
        infos.extend(self.translators.handles().iter().map(|h| h.info()));
        infos.extend(self.synthesizers.handles().iter().map(|h| h.info()));
        infos
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::manager::ProviderManager;
use super::{Recognizer, Stage, Synthesizer, Translator};
use crate::error::BackendError;
use crate::plan::{BackendConfig, Plan, PlanError};

/// Builds concrete backends from plan entries.
///
/// Returning `Ok(None)` means the factory does not know the kind.
pub trait BackendFactory: Send + Sync {
    fn recognizer(&self, config: &BackendConfig) -> Result<Option<Arc<dyn Recognizer>>, BackendError>;

    fn translator(&self, config: &BackendConfig) -> Result<Option<Arc<dyn Translator>>, BackendError>;

    fn synthesizer(&self, config: &BackendConfig) -> Result<Option<Arc<dyn Synthesizer>>, BackendError>;
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("unknown {stage} backend kind '{kind}'")]
    UnknownKind { stage: Stage, kind: String },
    #[error("failed to create {stage} backend '{kind}': {source}")]
    Backend {
        stage: Stage,
        kind: String,
        #[source]
        source: BackendError,
    },
}

impl ProviderManager {
    /// Builds a manager from loaded plans.
    ///
    /// Each enabled backend kind is created once per stage, however many plans
    /// list it; disabled entries are never instantiated.
    pub fn from_plans(plans: Vec<Plan>, factory: &dyn BackendFactory) -> Result<Self, BootstrapError> {
        let manager = ProviderManager::new();

        for plan in plans {
            for backend in plan.recognition.enabled_backends() {
                if manager.registry().recognizers.contains(&backend.kind) {
                    continue;
                }
                let created = build(Stage::Recognition, backend, |c| factory.recognizer(c))?;
                manager.registry().recognizers.register(created, backend.timeout);
            }
            for backend in plan.translation.enabled_backends() {
                if manager.registry().translators.contains(&backend.kind) {
                    continue;
                }
                let created = build(Stage::Translation, backend, |c| factory.translator(c))?;
                manager.registry().translators.register(created, backend.timeout);
            }
            for backend in plan.synthesis.enabled_backends() {
                if manager.registry().synthesizers.contains(&backend.kind) {
                    continue;
                }
                let created = build(Stage::Synthesis, backend, |c| factory.synthesizer(c))?;
                manager.registry().synthesizers.register(created, backend.timeout);
            }
            manager.register_plan(plan)?;
        }

        info!(
            plans = manager.plans().len(),
            recognizers = manager.registry().recognizers.len(),
            translators = manager.registry().translators.len(),
            synthesizers = manager.registry().synthesizers.len(),
            "Provider manager initialized"
        );
        Ok(manager)
    }
}

fn build<T: ?Sized>(
    stage: Stage,
    config: &BackendConfig,
    create: impl FnOnce(&BackendConfig) -> Result<Option<Arc<T>>, BackendError>,
) -> Result<Arc<T>, BootstrapError> {
    match create(config) {
        Ok(Some(backend)) => Ok(backend),
        Ok(None) => Err(BootstrapError::UnknownKind {
            stage,
            kind: config.kind.clone(),
        }),
        Err(source) => Err(BootstrapError::Backend {
            stage,
            kind: config.kind.clone(),
            source,
        }),
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::health::HealthStatus;
use super::registry::{BackendInfo, BackendRegistry, StageRegistry};
use super::selector::{CandidateHealth, RoundRobin, select_candidates};
use super::{
    Backend, ProviderResponse, RecognizeRequest, RecognizeResponse, Stage, SynthesizeRequest,
    SynthesizeResponse, TranslateRequest, TranslateResponse,
};
use crate::error::{BackendError, DispatchError};
use crate::plan::{FailoverStrategy, Plan, PlanError, PlanStore};

/// Outcome of probing one unhealthy backend.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub stage: Stage,
    pub backend: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: HealthStatus,
}

/// A successful dispatch: which backend answered, what it said, how long it took.
struct Dispatched<T> {
    backend: String,
    value: T,
    latency: Duration,
}

impl<T> Dispatched<T> {
    fn meta(&self) -> ProviderResponse {
        ProviderResponse {
            backend: self.backend.clone(),
            success: true,
            latency_ms: self.latency.as_millis() as u64,
            error: None,
            timestamp: Utc::now(),
        }
    }
}

/// Routes stage requests to backends according to each client's plan.
///
/// Created once at startup and shared via `Arc`.
pub struct ProviderManager {
    registry: BackendRegistry,
    plans: PlanStore,
    rotations: [RoundRobin; 3],
}

impl ProviderManager {
    pub fn new() -> Self {
        Self {
            registry: BackendRegistry::new(),
            plans: PlanStore::new(),
            rotations: Default::default(),
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn plans(&self) -> &PlanStore {
        &self.plans
    }

    pub fn register_plan(&self, plan: Plan) -> Result<(), PlanError> {
        self.plans.register(plan)
    }

    pub fn plan(&self, client_id: &str) -> Option<Arc<Plan>> {
        self.plans.get(client_id)
    }

    pub fn infos(&self) -> Vec<BackendInfo> {
        self.registry.infos()
    }

    fn rotation(&self, stage: Stage) -> &RoundRobin {
        match stage {
            Stage::Recognition => &self.rotations[0],
            Stage::Translation => &self.rotations[1],
            Stage::Synthesis => &self.rotations[2],
        }
    }

    /// Transcribes audio. Routing uses the request's language hint.
    pub async fn recognize(&self, request: &RecognizeRequest) -> Result<RecognizeResponse, DispatchError> {
        let language = request
            .language_hint
            .as_deref()
            .or(request.context.language.as_deref());
        let done = self
            .dispatch(
                Stage::Recognition,
                &request.context.client_id,
                language,
                &self.registry.recognizers,
                |backend| async move { backend.recognize(request).await },
            )
            .await?;

        let meta = done.meta();
        let transcription = done.value;
        Ok(RecognizeResponse {
            meta,
            transcript: transcription.text.trim().to_string(),
            detected_language: transcription.language,
            confidence: transcription.confidence.unwrap_or(1.0),
        })
    }

    /// Translates text. Routing uses the target language.
    pub async fn translate(&self, request: &TranslateRequest) -> Result<TranslateResponse, DispatchError> {
        let done = self
            .dispatch(
                Stage::Translation,
                &request.context.client_id,
                Some(request.target_lang.as_str()),
                &self.registry.translators,
                |backend| async move { backend.translate(request).await },
            )
            .await?;

        Ok(TranslateResponse {
            meta: done.meta(),
            text: done.value.trim().to_string(),
            source_lang: request.source_lang.clone(),
            target_lang: request.target_lang.clone(),
        })
    }

    /// Synthesizes speech. Routing uses the output language.
    pub async fn synthesize(&self, request: &SynthesizeRequest) -> Result<SynthesizeResponse, DispatchError> {
        let done = self
            .dispatch(
                Stage::Synthesis,
                &request.context.client_id,
                Some(request.language.as_str()),
                &self.registry.synthesizers,
                |backend| async move { backend.synthesize(request).await },
            )
            .await?;

        let meta = done.meta();
        let speech = done.value;
        Ok(SynthesizeResponse {
            meta,
            audio: speech.audio,
            format: speech.format,
            duration_secs: speech.duration_secs,
            voice: request.voice.clone(),
        })
    }

    /// Tries candidates in routing order until one succeeds or failover stops.
    ///
    /// Unregistered and unhealthy candidates are skipped without counting as
    /// attempts. No lock is held while a backend call is in flight.
    async fn dispatch<B, T, F, Fut>(
        &self,
        stage: Stage,
        client_id: &str,
        language: Option<&str>,
        registry: &StageRegistry<B>,
        call: F,
    ) -> Result<Dispatched<T>, DispatchError>
    where
        B: ?Sized + Backend,
        F: Fn(Arc<B>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let plan = self
            .plans
            .get(client_id)
            .ok_or_else(|| DispatchError::UnknownClient(client_id.to_string()))?;
        let config = plan.stage(stage);

        let candidates = select_candidates(config, language, self.rotation(stage), |kind| {
            registry.get(kind).map(|handle| {
                let (status, metrics) = (handle.status(), handle.metrics());
                CandidateHealth {
                    status,
                    average_latency_ms: metrics.average_latency_ms(),
                }
            })
        });
        debug!(%stage, client_id, ?language, ?candidates, "Dispatching");

        let mut last_failure: Option<(String, BackendError)> = None;

        for kind in candidates {
            let Some(handle) = registry.get(&kind) else {
                debug!(%stage, backend = %kind, "Backend not registered, skipping");
                continue;
            };
            if handle.status() == HealthStatus::Unhealthy {
                debug!(%stage, backend = %kind, "Backend unhealthy, skipping");
                continue;
            }

            let timeout = config
                .backend(&kind)
                .map(|b| b.timeout)
                .unwrap_or_else(|| handle.timeout());

            let started = Instant::now();
            let outcome = match tokio::time::timeout(timeout, call(handle.backend())).await {
                Ok(result) => result,
                Err(_) => Err(BackendError::Timeout(timeout)),
            };
            let latency = started.elapsed();

            match outcome {
                Ok(value) => {
                    handle.record_outcome(latency, true, None);
                    debug!(%stage, backend = %kind, latency_ms = latency.as_millis() as u64, "Backend call succeeded");
                    return Ok(Dispatched {
                        backend: kind,
                        value,
                        latency,
                    });
                }
                Err(err) => {
                    let message = err.to_string();
                    handle.record_outcome(latency, false, Some(&message));
                    warn!(%stage, backend = %kind, client_id, error = %message, "Backend call failed");
                    last_failure = Some((kind, err));
                    // TryNext and TryAll both walk the remaining candidates.
                    if config.failover_strategy == FailoverStrategy::None {
                        break;
                    }
                }
            }
        }

        Err(match last_failure {
            Some((backend, source)) => DispatchError::Exhausted {
                stage,
                backend,
                source,
            },
            None => DispatchError::NoBackendAvailable { stage },
        })
    }

    /// Health-checks every unhealthy backend and records the outcome.
    ///
    /// This is the only way an unhealthy backend re-enters rotation.
    pub async fn probe_all(&self) -> Vec<ProbeReport> {
        let mut reports = Vec::new();
        probe_stage(&self.registry.recognizers, &mut reports).await;
        probe_stage(&self.registry.translators, &mut reports).await;
        probe_stage(&self.registry.synthesizers, &mut reports).await;
        if !reports.is_empty() {
            let recovered = reports.iter().filter(|r| r.healthy).count();
            info!(probed = reports.len(), recovered, "Backend probe finished");
        }
        reports
    }
}

impl Default for ProviderManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn probe_stage<B: ?Sized + Backend>(registry: &StageRegistry<B>, reports: &mut Vec<ProbeReport>) {
    for handle in registry.handles() {
        if handle.status() != HealthStatus::Unhealthy {
            continue;
        }
        let backend = handle.backend();
        let started = Instant::now();
        let outcome = match tokio::time::timeout(handle.timeout(), backend.health_check()).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(handle.timeout())),
        };
        let latency = started.elapsed();
        let error = outcome.err().map(|e| e.to_string());
        handle.record_outcome(latency, error.is_none(), error.as_deref());

        if let Some(error) = &error {
            debug!(stage = %handle.stage(), backend = %handle.kind(), %error, "Probe failed");
        } else {
            info!(stage = %handle.stage(), backend = %handle.kind(), "Backend recovered");
        }
        reports.push(ProbeReport {
            stage: handle.stage(),
            backend: handle.kind().to_string(),
            healthy: error.is_none(),
            error,
            status: handle.status(),
        });
    }
}

pub mod loader;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::info;

use crate::pipeline::language::{LanguagePolicy, primary_subtag};
use crate::provider::Stage;

pub use loader::{PlanError, expand_env_vars, load_plans, parse_plans, validate};

const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do after a backend call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverStrategy {
    /// Return the first failure.
    None,
    /// Move on to the next candidate.
    #[default]
    #[serde(alias = "next", alias = "try-next")]
    TryNext,
    /// Consider every candidate before giving up.
    #[serde(alias = "all", alias = "try-all")]
    TryAll,
}

/// Order in which candidates are tried absent failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    #[default]
    Priority,
    Latency,
    /// Currently ordered like `Priority`; there is no cost model.
    Cost,
    #[serde(alias = "round-robin")]
    RoundRobin,
}

/// Configuration of one backend inside a stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Higher is preferred.
    #[serde(default)]
    pub priority: i32,
    /// Credential references, e.g. `{"api_key": "${OPENAI_API_KEY}"}`.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
    #[serde(
        default = "default_timeout",
        serialize_with = "serialize_timeout",
        deserialize_with = "deserialize_timeout"
    )]
    pub timeout: Duration,
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,
}

impl BackendConfig {
    pub fn new(kind: impl Into<String>, priority: i32) -> Self {
        Self {
            kind: kind.into(),
            enabled: true,
            priority,
            credentials: HashMap::new(),
            timeout: DEFAULT_BACKEND_TIMEOUT,
            options: HashMap::new(),
        }
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }

    pub fn credential(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Routing and failover configuration for one stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default)]
    pub service_type: Option<Stage>,
    #[serde(alias = "providers")]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub failover_strategy: FailoverStrategy,
    #[serde(default)]
    pub routing_strategy: RoutingStrategy,
    /// Language → backend kind, bypassing routing entirely.
    #[serde(default, alias = "language_providers")]
    pub language_overrides: HashMap<String, String>,
}

impl StageConfig {
    pub fn backend(&self, kind: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.kind == kind)
    }

    pub fn enabled_backends(&self) -> impl Iterator<Item = &BackendConfig> {
        self.backends.iter().filter(|b| b.enabled)
    }

    /// Backend forced for `language`: exact tag first, then its primary subtag.
    pub fn override_for(&self, language: &str) -> Option<&str> {
        self.language_overrides
            .get(language)
            .or_else(|| self.language_overrides.get(primary_subtag(language)))
            .map(String::as_str)
    }
}

/// Service-level targets, validated at load time only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sla {
    pub max_latency_ms: u64,
    pub min_availability: f64,
    pub max_error_rate: f64,
}

impl Default for Sla {
    fn default() -> Self {
        Self {
            max_latency_ms: 3000,
            min_availability: 0.99,
            max_error_rate: 0.01,
        }
    }
}

/// A client's plan. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub client_id: String,
    #[serde(default)]
    pub plan_name: String,
    #[serde(alias = "asr_config")]
    pub recognition: StageConfig,
    #[serde(alias = "translation_config")]
    pub translation: StageConfig,
    #[serde(alias = "tts_config")]
    pub synthesis: StageConfig,
    #[serde(default)]
    pub sla: Sla,
    #[serde(default)]
    pub language_policy: LanguagePolicy,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Plan {
    pub fn stage(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::Recognition => &self.recognition,
            Stage::Translation => &self.translation,
            Stage::Synthesis => &self.synthesis,
        }
    }
}

/// In-memory client id → plan mapping, shared across connections.
#[derive(Default)]
pub struct PlanStore {
    plans: RwLock<HashMap<String, Arc<Plan>>>,
}

impl PlanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a plan, replacing any previous plan for the client.
    pub fn register(&self, plan: Plan) -> Result<(), PlanError> {
        validate(&plan)?;
        info!(client_id = %plan.client_id, plan = %plan.plan_name, "Client plan registered");
        self.plans
            .write()
            .insert(plan.client_id.clone(), Arc::new(plan));
        Ok(())
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<Plan>> {
        self.plans.read().get(client_id).cloned()
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.plans.read().contains_key(client_id)
    }

    pub fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plans.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.plans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.read().is_empty()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_timeout() -> Duration {
    DEFAULT_BACKEND_TIMEOUT
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimeout {
    Millis(u64),
    Text(String),
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawTimeout::deserialize(deserializer)? {
        RawTimeout::Millis(ms) => Ok(Duration::from_millis(ms)),
        RawTimeout::Text(text) => humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom),
    }
}

fn serialize_timeout<S>(timeout: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(timeout.as_millis() as u64)
}

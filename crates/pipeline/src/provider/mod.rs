pub mod bootstrap;
pub mod health;
pub mod manager;
pub mod registry;
pub mod selector;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

pub use bootstrap::{BackendFactory, BootstrapError};
pub use health::{HealthStatus, HealthTracker, Metrics};
pub use manager::{ProbeReport, ProviderManager};
pub use registry::{BackendHandle, BackendInfo, BackendRegistry, StageRegistry};
pub use selector::{CandidateHealth, RoundRobin, select_candidates};

/// One of the three pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[serde(alias = "asr")]
    Recognition,
    Translation,
    #[serde(alias = "tts")]
    Synthesis,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Recognition, Stage::Translation, Stage::Synthesis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Recognition => "recognition",
            Stage::Translation => "translation",
            Stage::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request context carried through every stage call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub client_id: String,
    /// Language used for routing overrides (ISO 639-1, optionally with region).
    pub language: Option<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }
}

/// Request to transcribe an audio payload.
#[derive(Debug, Clone)]
pub struct RecognizeRequest {
    /// Opaque audio bytes; interpretation is up to the backend.
    pub audio: Vec<u8>,
    /// Container/encoding tag, e.g. "pcm", "wav", "webm".
    pub format: String,
    pub sample_rate: u32,
    pub language_hint: Option<String>,
    pub context: RequestContext,
}

/// Request to translate a piece of text.
#[derive(Debug, Clone)]
pub struct TranslateRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub context: RequestContext,
}

/// Request to synthesize speech.
#[derive(Debug, Clone)]
pub struct SynthesizeRequest {
    pub text: String,
    pub voice: String,
    pub language: String,
    pub context: RequestContext,
}

/// What a recognizer hands back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
    pub confidence: Option<f64>,
}

/// What a synthesizer hands back.
#[derive(Debug, Clone, Default)]
pub struct SpeechAudio {
    pub audio: Vec<u8>,
    pub format: String,
    pub duration_secs: Option<f64>,
}

/// Envelope shared by every stage response.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub backend: String,
    pub success: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecognizeResponse {
    #[serde(flatten)]
    pub meta: ProviderResponse,
    pub transcript: String,
    pub detected_language: Option<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateResponse {
    #[serde(flatten)]
    pub meta: ProviderResponse,
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesizeResponse {
    #[serde(flatten)]
    pub meta: ProviderResponse,
    #[serde(skip)]
    pub audio: Vec<u8>,
    pub format: String,
    pub duration_secs: Option<f64>,
    pub voice: String,
}

/// Behaviour shared by every backend regardless of stage.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Backend kind as named in plans, e.g. "openai_asr".
    fn kind(&self) -> &str;

    /// Human-readable backend name.
    fn name(&self) -> &str {
        self.kind()
    }

    /// Verifies the backend is reachable without doing billable work.
    async fn health_check(&self) -> Result<(), BackendError>;
}

/// Speech-to-text capability.
#[async_trait]
pub trait Recognizer: Backend {
    async fn recognize(&self, request: &RecognizeRequest) -> Result<Transcription, BackendError>;
}

/// Text translation capability.
#[async_trait]
pub trait Translator: Backend {
    async fn translate(&self, request: &TranslateRequest) -> Result<String, BackendError>;
}

/// Text-to-speech capability.
#[async_trait]
pub trait Synthesizer: Backend {
    async fn synthesize(&self, request: &SynthesizeRequest) -> Result<SpeechAudio, BackendError>;
}

//! OpenAI-compatible HTTP backends: Whisper, chat completions and speech.

mod asr;
mod translation;
mod tts;
pub mod wav;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

pub use asr::OpenAiRecognizer;
pub use translation::OpenAiTranslator;
pub use tts::OpenAiSynthesizer;

use crate::error::BackendError;
use crate::plan::BackendConfig;
use crate::provider::{BackendFactory, Recognizer, Synthesizer, Translator};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub const KIND_ASR: &str = "openai_asr";
pub const KIND_TRANSLATION: &str = "openai_translation";
pub const KIND_TTS: &str = "openai_tts";

/// Authenticated HTTP client shared by the three OpenAI backends.
#[derive(Clone)]
pub(crate) struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    fn from_config(config: &BackendConfig, default_base_url: &str) -> Result<Self, BackendError> {
        let api_key = config
            .credential("api_key")
            .ok_or_else(|| BackendError::Other(format!("{}: api_key credential is required", config.kind)))?
            .to_string();
        let base_url = config
            .option_str("base_url")
            .unwrap_or(default_base_url)
            .trim_end_matches('/')
            .to_string();
        // The dispatch timeout is authoritative; this only bounds stuck sockets.
        let http = reqwest::Client::builder()
            .timeout(config.timeout + Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http.post(self.url(path)).bearer_auth(&self.api_key)
    }

    /// Lists models, which verifies the key without billable work.
    async fn check_models(&self) -> Result<(), BackendError> {
        let response = self
            .http
            .get(self.url("models"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        ensure_success(response).await.map(|_| ())
    }
}

/// Turns a non-2xx response into [`BackendError::Status`].
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status {
        code: status.as_u16(),
        body,
    })
}

/// Builds OpenAI backends for the `openai_*` kinds.
pub struct OpenAiFactory {
    base_url: String,
}

impl OpenAiFactory {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for OpenAiFactory {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl BackendFactory for OpenAiFactory {
    fn recognizer(&self, config: &BackendConfig) -> Result<Option<Arc<dyn Recognizer>>, BackendError> {
        if config.kind != KIND_ASR {
            return Ok(None);
        }
        let client = OpenAiClient::from_config(config, &self.base_url)?;
        let backend = OpenAiRecognizer::new(client, config);
        info!(backend = KIND_ASR, model = %backend.model(), "OpenAI recognizer created");
        Ok(Some(Arc::new(backend)))
    }

    fn translator(&self, config: &BackendConfig) -> Result<Option<Arc<dyn Translator>>, BackendError> {
        if config.kind != KIND_TRANSLATION {
            return Ok(None);
        }
        let client = OpenAiClient::from_config(config, &self.base_url)?;
        let backend = OpenAiTranslator::new(client, config);
        info!(backend = KIND_TRANSLATION, model = %backend.model(), "OpenAI translator created");
        Ok(Some(Arc::new(backend)))
    }

    fn synthesizer(&self, config: &BackendConfig) -> Result<Option<Arc<dyn Synthesizer>>, BackendError> {
        if config.kind != KIND_TTS {
            return Ok(None);
        }
        let client = OpenAiClient::from_config(config, &self.base_url)?;
        let backend = OpenAiSynthesizer::new(client, config);
        info!(backend = KIND_TTS, model = %backend.model(), "OpenAI synthesizer created");
        Ok(Some(Arc::new(backend)))
    }
}

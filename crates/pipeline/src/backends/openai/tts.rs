use async_trait::async_trait;
use serde::Serialize;

use super::{KIND_TTS, OpenAiClient, ensure_success};
use crate::error::BackendError;
use crate::plan::BackendConfig;
use crate::provider::{Backend, SpeechAudio, SynthesizeRequest, Synthesizer};

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f64,
    response_format: &'a str,
}

/// Speech synthesis through `/audio/speech`.
pub struct OpenAiSynthesizer {
    client: OpenAiClient,
    model: String,
    speed: f64,
    format: String,
}

impl OpenAiSynthesizer {
    pub(crate) fn new(client: OpenAiClient, config: &BackendConfig) -> Self {
        let speed = config
            .options
            .get("speed")
            .and_then(|v| v.as_f64())
            .filter(|s| *s > 0.0)
            .unwrap_or(1.0);
        Self {
            client,
            model: config.option_str("model").unwrap_or("tts-1").to_string(),
            speed,
            format: config.option_str("format").unwrap_or("mp3").to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Backend for OpenAiSynthesizer {
    fn kind(&self) -> &str {
        KIND_TTS
    }

    fn name(&self) -> &str {
        "OpenAI TTS"
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        self.client.check_models().await
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    async fn synthesize(&self, request: &SynthesizeRequest) -> Result<SpeechAudio, BackendError> {
        let voice = if request.voice.is_empty() {
            "alloy"
        } else {
            request.voice.as_str()
        };
        let body = SpeechRequest {
            model: &self.model,
            input: &request.text,
            voice,
            speed: self.speed,
            response_format: &self.format,
        };

        let response = self.client.post("audio/speech").json(&body).send().await?;
        let audio = ensure_success(response).await?.bytes().await?.to_vec();
        if audio.is_empty() {
            return Err(BackendError::InvalidResponse("empty audio".to_string()));
        }

        Ok(SpeechAudio {
            audio,
            format: self.format.clone(),
            duration_secs: None,
        })
    }
}

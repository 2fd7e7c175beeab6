use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::wav::{is_raw_pcm, pcm_to_wav, upload_name};
use super::{KIND_ASR, OpenAiClient, ensure_success};
use crate::error::BackendError;
use crate::plan::BackendConfig;
use crate::provider::{Backend, RecognizeRequest, Recognizer, Transcription};

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// Whisper transcription via `/audio/transcriptions`.
pub struct OpenAiRecognizer {
    client: OpenAiClient,
    model: String,
}

impl OpenAiRecognizer {
    pub(crate) fn new(client: OpenAiClient, config: &BackendConfig) -> Self {
        Self {
            client,
            model: config.option_str("model").unwrap_or("whisper-1").to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Backend for OpenAiRecognizer {
    fn kind(&self) -> &str {
        KIND_ASR
    }

    fn name(&self) -> &str {
        "OpenAI Whisper"
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        self.client.check_models().await
    }
}

#[async_trait]
impl Recognizer for OpenAiRecognizer {
    async fn recognize(&self, request: &RecognizeRequest) -> Result<Transcription, BackendError> {
        let (file, filename, mime) = if is_raw_pcm(&request.format) {
            (pcm_to_wav(&request.audio, request.sample_rate)?, "audio.wav".to_string(), "audio/wav")
        } else {
            let (name, mime) = upload_name(&request.format);
            (request.audio.clone(), name, mime)
        };
        debug!(bytes = file.len(), %filename, model = %self.model, "Uploading audio to Whisper");

        let part = Part::bytes(file)
            .file_name(filename)
            .mime_str(mime)
            .map_err(BackendError::from)?;
        let mut form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");
        if let Some(language) = &request.language_hint {
            form = form.text("language", language.clone());
        }

        let response = self
            .client
            .post("audio/transcriptions")
            .multipart(form)
            .send()
            .await?;
        let body: VerboseTranscription = ensure_success(response).await?.json().await?;

        Ok(Transcription {
            text: body.text.trim().to_string(),
            language: body.language.filter(|l| !l.is_empty()),
            // Whisper does not report confidence.
            confidence: Some(1.0),
        })
    }
}

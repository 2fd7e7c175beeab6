use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{KIND_TRANSLATION, OpenAiClient, ensure_success};
use crate::error::BackendError;
use crate::pipeline::language_name;
use crate::plan::BackendConfig;
use crate::provider::{Backend, TranslateRequest, Translator};

const SYSTEM_PROMPT: &str = "You are a professional translator. Translate accurately and naturally.";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Translation through `/chat/completions`.
pub struct OpenAiTranslator {
    client: OpenAiClient,
    model: String,
    max_tokens: u32,
}

impl OpenAiTranslator {
    pub(crate) fn new(client: OpenAiClient, config: &BackendConfig) -> Self {
        let max_tokens = config
            .options
            .get("max_tokens")
            .and_then(|v| v.as_u64())
            .map(|v| v as u32)
            .unwrap_or(500);
        Self {
            client,
            model: config.option_str("model").unwrap_or("gpt-4o-mini").to_string(),
            max_tokens,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

pub(crate) fn translation_prompt(text: &str, source: &str, target: &str) -> String {
    format!(
        "Translate the following {} text to {}. Only return the translated text without any explanation:\n\n{}",
        language_name(source),
        language_name(target),
        text
    )
}

#[async_trait]
impl Backend for OpenAiTranslator {
    fn kind(&self) -> &str {
        KIND_TRANSLATION
    }

    fn name(&self) -> &str {
        "OpenAI GPT Translation"
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        self.client.check_models().await
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    async fn translate(&self, request: &TranslateRequest) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: translation_prompt(&request.text, &request.source_lang, &request.target_lang),
                },
            ],
            temperature: 0.3,
            max_tokens: self.max_tokens,
        };

        let response = self.client.post("chat/completions").json(&body).send().await?;
        let reply: ChatResponse = ensure_success(response).await?.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| BackendError::InvalidResponse("no choices in completion".to_string()))
    }
}

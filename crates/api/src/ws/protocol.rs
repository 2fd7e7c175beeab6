use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use voxrelay_pipeline::{ConfigUpdate, PartialTranscript, ProcessingMode, SegmentResult, SessionEvent};

/// Frames sent by the client, tagged by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    AudioChunk {
        audio_data: String,
        #[serde(default)]
        sample_rate: Option<u32>,
        #[serde(default)]
        format: Option<String>,
    },
    Config {
        #[serde(default)]
        config: Option<ConfigPayload>,
    },
    Stop,
    Ping,
}

/// Runtime overrides as they arrive on the wire. Zero and empty values are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigPayload {
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub source_lang: Option<String>,
    #[serde(default)]
    pub target_lang: Option<String>,
    #[serde(default)]
    pub vad_threshold: Option<f64>,
    /// Milliseconds.
    #[serde(default)]
    pub silence_duration: Option<u64>,
    /// Milliseconds.
    #[serde(default)]
    pub min_speech_duration: Option<u64>,
}

impl ConfigPayload {
    pub fn into_update(self) -> Result<ConfigUpdate, String> {
        let mode = match self.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => Some(raw.parse::<ProcessingMode>()?),
            None => None,
        };
        Ok(ConfigUpdate {
            mode,
            source_lang: self.source_lang,
            target_lang: self.target_lang,
            vad_threshold: self.vad_threshold.filter(|t| *t > 0.0),
            silence_duration_ms: self.silence_duration.filter(|ms| *ms > 0),
            min_speech_ms: self.min_speech_duration.filter(|ms| *ms > 0),
        })
    }
}

/// Frames sent to the client, tagged by `type`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected {
        connection_id: String,
        client_id: String,
        mode: ProcessingMode,
    },
    PartialTranscript {
        transcript: String,
        confidence: f64,
        is_partial: bool,
        backend: String,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },
    FinalTranscript {
        transcript: String,
        confidence: f64,
        detected_lang: String,
        translation: String,
        target_lang: String,
        tts_audio_data: String,
        tts_audio_format: String,
        voice: String,
        asr_latency_ms: u64,
        detect_latency_ms: u64,
        trans_latency_ms: u64,
        tts_latency_ms: u64,
        total_latency_ms: u64,
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { error: message.into() }
    }

    pub fn to_json(&self) -> String {
        // Every variant is plain data; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","error":"encoding failed"}"#.to_string())
    }
}

impl From<PartialTranscript> for ServerMessage {
    fn from(partial: PartialTranscript) -> Self {
        ServerMessage::PartialTranscript {
            transcript: partial.transcript,
            confidence: partial.confidence,
            is_partial: true,
            backend: partial.backend,
            latency_ms: partial.latency_ms,
            timestamp: partial.timestamp,
        }
    }
}

impl From<SegmentResult> for ServerMessage {
    fn from(result: SegmentResult) -> Self {
        let tts_audio_data = if result.audio.is_empty() {
            String::new()
        } else {
            STANDARD.encode(&result.audio)
        };
        ServerMessage::FinalTranscript {
            transcript: result.transcript,
            confidence: result.confidence,
            detected_lang: result.detected_language,
            translation: result.translation,
            target_lang: result.target_language,
            tts_audio_data,
            tts_audio_format: result.audio_format,
            voice: result.voice,
            asr_latency_ms: result.latency.recognition_ms,
            detect_latency_ms: result.latency.detection_ms,
            trans_latency_ms: result.latency.translation_ms,
            tts_latency_ms: result.latency.synthesis_ms,
            total_latency_ms: result.latency.total_ms,
            timestamp: result.timestamp,
        }
    }
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Partial(partial) => partial.into(),
            SessionEvent::Final(result) => (*result).into(),
            SessionEvent::Error { message } => ServerMessage::Error { error: message },
        }
    }
}

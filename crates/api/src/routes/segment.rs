use axum::{
    Json,
    extract::{Multipart, State},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;
use voxrelay_pipeline::{SegmentInput, SegmentResult, pipeline::StageBackends, run_segment};

use crate::{error::ApiError, state::AppState};

/// Largest accepted upload.
pub const MAX_SEGMENT_BYTES: usize = 16 << 20;

#[derive(Debug, Serialize)]
pub struct SegmentDiagnostics {
    pub asr_latency_ms: u64,
    pub detect_latency_ms: u64,
    pub translate_latency_ms: u64,
    pub tts_latency_ms: u64,
    pub e2e_latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SegmentResponse {
    pub session_id: String,
    pub client_id: String,
    pub source_text: String,
    pub source_lang: String,
    pub confidence: f64,
    pub translated_text: String,
    pub target_lang: String,
    pub tts_audio: String,
    pub tts_audio_format: String,
    pub voice: String,
    pub backends: StageBackends,
    pub diagnostics: SegmentDiagnostics,
    pub timestamp: DateTime<Utc>,
}

impl SegmentResponse {
    fn new(session_id: String, client_id: String, result: SegmentResult) -> Self {
        let latency = &result.latency;
        let diagnostics = SegmentDiagnostics {
            asr_latency_ms: latency.recognition_ms,
            detect_latency_ms: latency.detection_ms,
            translate_latency_ms: latency.translation_ms,
            tts_latency_ms: latency.synthesis_ms,
            e2e_latency_ms: latency.total_ms,
        };
        Self {
            session_id,
            client_id,
            tts_audio: STANDARD.encode(&result.audio),
            source_text: result.transcript,
            source_lang: result.detected_language,
            confidence: result.confidence,
            translated_text: result.translation,
            target_lang: result.target_language,
            tts_audio_format: result.audio_format,
            voice: result.voice,
            backends: result.backends,
            diagnostics,
            timestamp: result.timestamp,
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Run one complete audio segment through the pipeline.
/// Fields: `audio` (binary), `client_id`, `source_lang`, `target_lang`,
/// `sample_rate`, `format`, `session_id` (all text, optional).
pub async fn process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SegmentResponse>, ApiError> {
    let mut audio: Option<(Option<String>, Vec<u8>)> = None; // (filename, bytes)
    let mut client_id: Option<String> = None;
    let mut source_lang: Option<String> = None;
    let mut target_lang: Option<String> = None;
    let mut sample_rate: Option<u32> = None;
    let mut format: Option<String> = None;
    let mut session_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::BadRequest(format!("Multipart error: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();

        if name == "audio" {
            let filename = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read audio: {}", e)))?;
            audio = Some((filename, bytes.to_vec()));
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?;
        match name.as_str() {
            "client_id" => client_id = non_empty(text),
            "source_lang" => source_lang = non_empty(text),
            "target_lang" => target_lang = non_empty(text),
            "format" => format = non_empty(text),
            "session_id" => session_id = non_empty(text),
            "sample_rate" => {
                if let Some(raw) = non_empty(text) {
                    let rate = raw
                        .parse::<u32>()
                        .ok()
                        .filter(|r| *r > 0)
                        .ok_or_else(|| ApiError::BadRequest(format!("Invalid sample_rate: {raw}")))?;
                    sample_rate = Some(rate);
                }
            }
            _ => {}
        }
    }

    let (filename, bytes) = audio.ok_or_else(|| ApiError::BadRequest("Missing 'audio' field".to_string()))?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty 'audio' field".to_string()));
    }

    let session = &state.settings.session;
    let client_id = client_id.unwrap_or_else(|| session.default_client_id.clone());
    // Fall back to the upload's extension, then the configured default.
    let format = format
        .or_else(|| {
            filename
                .as_deref()
                .and_then(|f| f.rsplit_once('.'))
                .map(|(_, ext)| ext.to_ascii_lowercase())
        })
        .unwrap_or_else(|| session.default_format.clone());
    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    info!(%client_id, %session_id, bytes = bytes.len(), %format, "Segment request");

    let input = SegmentInput {
        client_id: client_id.clone(),
        audio: bytes,
        format,
        sample_rate: sample_rate.unwrap_or(session.default_sample_rate),
        source_lang,
        target_lang,
    };
    let result = run_segment(&state.manager, input).await?;

    Ok(Json(SegmentResponse::new(session_id, client_id, result)))
}

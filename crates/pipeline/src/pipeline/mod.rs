pub mod audio_buffer;
pub mod language;

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::provider::{
    ProviderManager, RecognizeRequest, RecognizeResponse, RequestContext, Stage, SynthesizeRequest,
    TranslateRequest,
};

pub use audio_buffer::ChunkAccumulator;
pub use language::{LanguagePolicy, detect_script_language, language_name, normalize_language};

/// One complete utterance to run through the pipeline.
#[derive(Debug, Clone)]
pub struct SegmentInput {
    pub client_id: String,
    pub audio: Vec<u8>,
    pub format: String,
    pub sample_rate: u32,
    /// Recognition hint; also the fallback when the recognizer reports no language.
    pub source_lang: Option<String>,
    /// Forces the translation target instead of the plan's language policy.
    pub target_lang: Option<String>,
}

/// Milliseconds spent in each step.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageLatency {
    pub recognition_ms: u64,
    pub detection_ms: u64,
    pub translation_ms: u64,
    pub synthesis_ms: u64,
    pub total_ms: u64,
}

/// Backend that served each stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageBackends {
    pub recognition: String,
    pub translation: String,
    pub synthesis: String,
}

/// Output of one full recognize → translate → synthesize run.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentResult {
    pub transcript: String,
    pub confidence: f64,
    pub detected_language: String,
    pub translation: String,
    pub target_language: String,
    #[serde(skip)]
    pub audio: Vec<u8>,
    pub audio_format: String,
    pub voice: String,
    pub backends: StageBackends,
    pub latency: StageLatency,
    pub timestamp: DateTime<Utc>,
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Runs one utterance through all three stages in order.
///
/// The first failing stage aborts the rest. An empty transcript ends the run
/// with [`PipelineError::EmptyTranscript`] before translation.
pub async fn run_segment(manager: &ProviderManager, input: SegmentInput) -> Result<SegmentResult, PipelineError> {
    let started = Instant::now();
    let plan = manager
        .plan(&input.client_id)
        .ok_or_else(|| PipelineError::Configuration(format!("unknown client: {}", input.client_id)))?;
    let source_hint = input.source_lang.as_deref().and_then(normalize_language);

    let recognized = manager
        .recognize(&RecognizeRequest {
            audio: input.audio,
            format: input.format,
            sample_rate: input.sample_rate,
            language_hint: source_hint.clone(),
            context: RequestContext::new(&input.client_id).with_language(source_hint.clone()),
        })
        .await
        .map_err(|e| PipelineError::from_dispatch(Stage::Recognition, e))?;
    let recognition_ms = recognized.meta.latency_ms;

    if recognized.transcript.is_empty() {
        debug!(client_id = %input.client_id, "Recognizer returned empty transcript");
        return Err(PipelineError::EmptyTranscript);
    }

    let detect_started = Instant::now();
    let detected_language = recognized
        .detected_language
        .as_deref()
        .and_then(normalize_language)
        .or(source_hint)
        .unwrap_or_else(|| detect_script_language(&recognized.transcript).to_string());
    let detection_ms = elapsed_ms(detect_started);

    let target_language = input
        .target_lang
        .as_deref()
        .and_then(normalize_language)
        .unwrap_or_else(|| plan.language_policy.target_for(&detected_language));

    let translated = manager
        .translate(&TranslateRequest {
            text: recognized.transcript.clone(),
            source_lang: detected_language.clone(),
            target_lang: target_language.clone(),
            context: RequestContext::new(&input.client_id).with_language(Some(target_language.clone())),
        })
        .await
        .map_err(|e| PipelineError::from_dispatch(Stage::Translation, e))?;

    let voice = plan.language_policy.voice_for(&target_language);
    let synthesized = manager
        .synthesize(&SynthesizeRequest {
            text: translated.text.clone(),
            voice: voice.clone(),
            language: target_language.clone(),
            context: RequestContext::new(&input.client_id).with_language(Some(target_language.clone())),
        })
        .await
        .map_err(|e| PipelineError::from_dispatch(Stage::Synthesis, e))?;

    let latency = StageLatency {
        recognition_ms,
        detection_ms,
        translation_ms: translated.meta.latency_ms,
        synthesis_ms: synthesized.meta.latency_ms,
        total_ms: elapsed_ms(started),
    };
    info!(
        client_id = %input.client_id,
        source = %detected_language,
        target = %target_language,
        total_ms = latency.total_ms,
        "Segment processed"
    );

    Ok(SegmentResult {
        transcript: recognized.transcript,
        confidence: recognized.confidence,
        detected_language,
        translation: translated.text,
        target_language,
        audio: synthesized.audio,
        audio_format: synthesized.format,
        voice,
        backends: StageBackends {
            recognition: recognized.meta.backend,
            translation: translated.meta.backend,
            synthesis: synthesized.meta.backend,
        },
        latency,
        timestamp: Utc::now(),
    })
}

/// Recognition only, for a single chunk. Used for pseudo-streaming partials.
pub async fn recognize_chunk(
    manager: &ProviderManager,
    client_id: &str,
    chunk: Vec<u8>,
    format: &str,
    sample_rate: u32,
    source_lang: Option<&str>,
) -> Result<RecognizeResponse, PipelineError> {
    let hint = source_lang.and_then(normalize_language);
    manager
        .recognize(&RecognizeRequest {
            audio: chunk,
            format: format.to_string(),
            sample_rate,
            language_hint: hint.clone(),
            context: RequestContext::new(client_id).with_language(hint),
        })
        .await
        .map_err(|e| PipelineError::from_dispatch(Stage::Recognition, e))
}

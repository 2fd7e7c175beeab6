use serde::{Deserialize, Serialize};

use crate::session::ProcessingMode;

/// Energy VAD thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    /// Normalized RMS (0.0-1.0) above which a chunk counts as speech.
    pub rms_threshold: f64,
    /// Silence after the last loud chunk that ends an utterance.
    pub silence_ms: u64,
    /// Utterances shorter than this are discarded.
    pub min_speech_ms: u64,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            rms_threshold: 0.08,
            silence_ms: 1000,
            min_speech_ms: 300,
        }
    }
}

/// Initial state of a hybrid session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub client_id: String,
    pub mode: ProcessingMode,
    /// Language hint passed to recognition. None = auto-detect.
    pub source_lang: Option<String>,
    /// Forced translation target. None = plan language policy.
    pub target_lang: Option<String>,
    pub vad: VadSettings,
    /// Used when a chunk does not carry its own sample rate.
    pub default_sample_rate: u32,
    /// Used when a chunk does not carry its own format.
    pub default_format: String,
    /// Capacity of the outbound event channel.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: "default".to_string(),
            mode: ProcessingMode::Hybrid,
            source_lang: None,
            target_lang: None,
            vad: VadSettings::default(),
            default_sample_rate: 16_000,
            default_format: "pcm".to_string(),
            event_buffer: 256,
        }
    }
}

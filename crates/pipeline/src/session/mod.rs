mod tasks;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::pipeline::{ChunkAccumulator, SegmentResult};
use crate::provider::ProviderManager;
use crate::vad::{EnergyVad, VadTransition};

use tasks::{ChunkJob, SegmentJob, SessionShared, spawn_final, spawn_partial};

/// How a session turns audio into results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// One final result per utterance.
    Segment,
    /// Partial transcripts only.
    Stream,
    /// Partials while speaking plus a final result per utterance.
    #[default]
    Hybrid,
}

impl ProcessingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Segment => "segment",
            ProcessingMode::Stream => "stream",
            ProcessingMode::Hybrid => "hybrid",
        }
    }

    fn emits_partials(&self) -> bool {
        matches!(self, ProcessingMode::Stream | ProcessingMode::Hybrid)
    }

    fn emits_finals(&self) -> bool {
        matches!(self, ProcessingMode::Segment | ProcessingMode::Hybrid)
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "segment" => Ok(ProcessingMode::Segment),
            "stream" => Ok(ProcessingMode::Stream),
            "hybrid" => Ok(ProcessingMode::Hybrid),
            other => Err(format!("unknown processing mode: {other}")),
        }
    }
}

/// Transcript of a single chunk, sent while the speaker is still talking.
#[derive(Debug, Clone, Serialize)]
pub struct PartialTranscript {
    pub transcript: String,
    pub confidence: f64,
    pub backend: String,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// Everything a session reports to its connection.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Partial(PartialTranscript),
    Final(Box<SegmentResult>),
    Error { message: String },
}

/// Audio received from the client.
#[derive(Debug, Clone, Default)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub sample_rate: Option<u32>,
    pub format: Option<String>,
}

impl AudioChunk {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }
}

/// Runtime overrides; `None` leaves a setting unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub mode: Option<ProcessingMode>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub vad_threshold: Option<f64>,
    pub silence_duration_ms: Option<u64>,
    pub min_speech_ms: Option<u64>,
}

/// Per-connection orchestrator: VAD, accumulator, partial and final tasks.
///
/// Owned by the connection's receive loop. Spawned tasks share only the
/// accumulator, the event sender and the in-flight counter.
pub struct HybridSession {
    shared: Arc<SessionShared>,
    vad: EnergyVad,
    mode: ProcessingMode,
    source_lang: Option<String>,
    target_lang: Option<String>,
    default_sample_rate: u32,
    default_format: String,
    speech_started_at: Option<Instant>,
    cancel: watch::Sender<bool>,
    stopped: bool,
}

impl HybridSession {
    /// Creates a session and the receiver for its events.
    pub fn new(manager: Arc<ProviderManager>, config: SessionConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events, events_rx) = mpsc::channel(config.event_buffer.max(1));
        let (cancel, _) = watch::channel(false);

        info!(client_id = %config.client_id, mode = %config.mode, "Session started");

        let session = Self {
            shared: Arc::new(SessionShared {
                manager,
                client_id: config.client_id,
                buffer: Mutex::new(ChunkAccumulator::new()),
                events,
                in_flight: Default::default(),
            }),
            vad: EnergyVad::new(&config.vad),
            mode: config.mode,
            source_lang: config.source_lang,
            target_lang: config.target_lang,
            default_sample_rate: config.default_sample_rate,
            default_format: config.default_format,
            speech_started_at: None,
            cancel,
            stopped: false,
        };
        (session, events_rx)
    }

    pub fn client_id(&self) -> &str {
        &self.shared.client_id
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn is_speaking(&self) -> bool {
        self.vad.is_speaking()
    }

    pub fn vad(&self) -> &EnergyVad {
        &self.vad
    }

    pub fn source_lang(&self) -> Option<&str> {
        self.source_lang.as_deref()
    }

    pub fn target_lang(&self) -> Option<&str> {
        self.target_lang.as_deref()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.shared.buffer.lock().len_bytes()
    }

    /// Partial and final tasks not yet finished.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.count()
    }

    /// Feeds one chunk through the VAD and spawns whatever work it triggers.
    ///
    /// Never waits on a backend.
    pub fn push_chunk(&mut self, chunk: AudioChunk) -> Result<(), SessionError> {
        if self.stopped {
            return Err(SessionError::Stopped);
        }
        let sample_rate = chunk.sample_rate.unwrap_or(self.default_sample_rate);
        let format = chunk.format.unwrap_or_else(|| self.default_format.clone());

        let was_speaking = self.vad.is_speaking();
        let is_speaking = self.vad.classify(&chunk.data, sample_rate);
        let transition = VadTransition::from_states(was_speaking, is_speaking);

        if self.mode.emits_partials() && !chunk.data.is_empty() {
            spawn_partial(
                &self.shared,
                self.cancel.subscribe(),
                ChunkJob {
                    chunk: chunk.data.clone(),
                    format: format.clone(),
                    sample_rate,
                    source_lang: self.source_lang.clone(),
                },
            );
        }

        match transition {
            // Silence outside an utterance is not kept.
            VadTransition::Silence => {}
            VadTransition::SpeechStart => {
                debug!(client_id = %self.shared.client_id, "Speech started");
                self.speech_started_at = Some(Instant::now());
                let mut buffer = self.shared.buffer.lock();
                buffer.clear();
                buffer.push(chunk.data);
            }
            VadTransition::Speaking => {
                self.shared.buffer.lock().push(chunk.data);
            }
            VadTransition::SpeechEnd => {
                self.shared.buffer.lock().push(chunk.data);
                self.handle_speech_end(format, sample_rate);
            }
        }
        Ok(())
    }

    fn handle_speech_end(&mut self, format: String, sample_rate: u32) {
        let speech = self
            .speech_started_at
            .take()
            .map(|start| self.vad.last_speech_at().saturating_duration_since(start))
            .unwrap_or_default();

        if speech < self.vad.min_speech_duration() {
            debug!(
                client_id = %self.shared.client_id,
                speech_ms = speech.as_millis() as u64,
                "Segment too short, discarding"
            );
            self.shared.buffer.lock().clear();
            return;
        }

        if !self.mode.emits_finals() {
            self.shared.buffer.lock().clear();
            return;
        }

        let audio = self.shared.buffer.lock().drain_all();
        debug!(
            client_id = %self.shared.client_id,
            bytes = audio.len(),
            speech_ms = speech.as_millis() as u64,
            "Speech ended, running pipeline"
        );
        spawn_final(
            &self.shared,
            self.cancel.subscribe(),
            SegmentJob {
                audio,
                format,
                sample_rate,
                source_lang: self.source_lang.clone(),
                target_lang: self.target_lang.clone(),
            },
        );
    }

    /// Applies runtime overrides. Takes effect from the next chunk.
    pub fn apply_config(&mut self, update: ConfigUpdate) {
        if let Some(mode) = update.mode {
            self.mode = mode;
        }
        if let Some(threshold) = update.vad_threshold {
            self.vad.set_rms_threshold(threshold);
        }
        if let Some(ms) = update.silence_duration_ms {
            self.vad.set_silence_duration(Duration::from_millis(ms));
        }
        if let Some(ms) = update.min_speech_ms {
            self.vad.set_min_speech_duration(Duration::from_millis(ms));
        }
        if let Some(lang) = update.source_lang {
            self.source_lang = Some(lang).filter(|l| !l.trim().is_empty());
        }
        if let Some(lang) = update.target_lang {
            self.target_lang = Some(lang).filter(|l| !l.trim().is_empty());
        }
        info!(
            client_id = %self.shared.client_id,
            mode = %self.mode,
            vad_threshold = self.vad.rms_threshold(),
            silence_ms = self.vad.silence_duration().as_millis() as u64,
            source = ?self.source_lang,
            target = ?self.target_lang,
            "Session reconfigured"
        );
    }

    /// Cancels outstanding tasks and waits for all of them to finish.
    ///
    /// No event is sent after this returns. Calling it again is a no-op.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.cancel.send_replace(true);
        self.shared.in_flight.wait_idle().await;
        self.shared.buffer.lock().clear();
        self.vad.reset();
        self.speech_started_at = None;
        info!(client_id = %self.shared.client_id, "Session stopped");
    }
}

impl Drop for HybridSession {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

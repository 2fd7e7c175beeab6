//! Scripted backends and plan builders for tests.
//!
//! Enabled for this crate's unit tests and, through the `testing` feature,
//! for the integration test crate.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::BackendError;
use crate::plan::{BackendConfig, Plan, StageConfig};
use crate::provider::{
    Backend, BackendFactory, ProviderManager, RecognizeRequest, Recognizer, SpeechAudio,
    SynthesizeRequest, Synthesizer, Transcription, TranslateRequest, Translator,
};

pub const TEST_CLIENT: &str = "test-client";

/// Queue of scripted outcomes plus counters, shared by every scripted backend.
struct Script<T> {
    kind: String,
    queued: Mutex<VecDeque<Result<T, BackendError>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    health_checks: AtomicUsize,
    healthy: bool,
}

impl<T> Script<T> {
    fn new(kind: String) -> Self {
        Self {
            kind,
            queued: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
            healthy: true,
        }
    }

    /// Counts the call, waits out any delay, then pops a queued outcome.
    async fn next(&self) -> Option<Result<T, BackendError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.queued.lock().pop_front()
    }

    fn health(&self) -> Result<(), BackendError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.healthy {
            Ok(())
        } else {
            Err(BackendError::Other(format!("{} is down", self.kind)))
        }
    }
}

macro_rules! scripted_common {
    ($ty:ident, $out:ty) => {
        impl $ty {
            pub fn with_delay(self, delay: Duration) -> Self {
                *self.script.delay.lock() = Some(delay);
                self
            }

            pub fn failing_health(mut self) -> Self {
                self.script.healthy = false;
                self
            }

            pub fn push_ok(&self, value: $out) {
                self.script.queued.lock().push_back(Ok(value));
            }

            pub fn push_error(&self, err: BackendError) {
                self.script.queued.lock().push_back(Err(err));
            }

            pub fn set_delay(&self, delay: Option<Duration>) {
                *self.script.delay.lock() = delay;
            }

            pub fn calls(&self) -> usize {
                self.script.calls.load(Ordering::SeqCst)
            }

            pub fn health_checks(&self) -> usize {
                self.script.health_checks.load(Ordering::SeqCst)
            }
        }

        #[async_trait]
        impl Backend for $ty {
            fn kind(&self) -> &str {
                &self.script.kind
            }

            async fn health_check(&self) -> Result<(), BackendError> {
                self.script.health()
            }
        }
    };
}

/// Recognizer returning a fixed transcript unless an outcome is queued.
pub struct ScriptedRecognizer {
    script: Script<Transcription>,
    transcript: String,
    language: Option<String>,
    audio_sizes: Mutex<Vec<usize>>,
}

impl ScriptedRecognizer {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            script: Script::new(kind.into()),
            transcript: "hello world".to_string(),
            language: Some("en".to_string()),
            audio_sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_transcript(mut self, text: impl Into<String>) -> Self {
        self.transcript = text.into();
        self
    }

    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language = language.map(str::to_string);
        self
    }

    /// Byte length of every audio payload received, in call order.
    pub fn audio_sizes(&self) -> Vec<usize> {
        self.audio_sizes.lock().clone()
    }
}

scripted_common!(ScriptedRecognizer, Transcription);

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, request: &RecognizeRequest) -> Result<Transcription, BackendError> {
        self.audio_sizes.lock().push(request.audio.len());
        match self.script.next().await {
            Some(outcome) => outcome,
            None => Ok(Transcription {
                text: self.transcript.clone(),
                language: self.language.clone(),
                confidence: Some(0.95),
            }),
        }
    }
}

/// Translator returning a fixed output unless an outcome is queued.
pub struct ScriptedTranslator {
    script: Script<String>,
    output: Option<String>,
    requests: Mutex<Vec<(String, String)>>,
}

impl ScriptedTranslator {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            script: Script::new(kind.into()),
            output: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_output(mut self, text: impl Into<String>) -> Self {
        self.output = Some(text.into());
        self
    }

    /// `(source, target)` of every request, in call order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().clone()
    }
}

scripted_common!(ScriptedTranslator, String);

#[async_trait]
impl Translator for ScriptedTranslator {
    async fn translate(&self, request: &TranslateRequest) -> Result<String, BackendError> {
        self.requests
            .lock()
            .push((request.source_lang.clone(), request.target_lang.clone()));
        match self.script.next().await {
            Some(outcome) => outcome,
            None => Ok(self
                .output
                .clone()
                .unwrap_or_else(|| format!("[{}] {}", request.target_lang, request.text))),
        }
    }
}

/// Synthesizer returning a few bytes of fake MP3 unless an outcome is queued.
pub struct ScriptedSynthesizer {
    script: Script<SpeechAudio>,
    voices: Mutex<Vec<String>>,
}

impl ScriptedSynthesizer {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            script: Script::new(kind.into()),
            voices: Mutex::new(Vec::new()),
        }
    }

    /// Voice of every request, in call order.
    pub fn voices(&self) -> Vec<String> {
        self.voices.lock().clone()
    }
}

scripted_common!(ScriptedSynthesizer, SpeechAudio);

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, request: &SynthesizeRequest) -> Result<SpeechAudio, BackendError> {
        self.voices.lock().push(request.voice.clone());
        match self.script.next().await {
            Some(outcome) => outcome,
            None => Ok(SpeechAudio {
                audio: vec![0xFF, 0xF3, 0x44, 0xC4],
                format: "mp3".to_string(),
                duration_secs: Some(0.5),
            }),
        }
    }
}

/// Factory that builds scripted backends for any kind not explicitly rejected.
#[derive(Default)]
pub struct ScriptedFactory {
    rejected: HashSet<String>,
    created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn rejecting(kind: &str) -> Self {
        Self {
            rejected: HashSet::from([kind.to_string()]),
            created: AtomicUsize::new(0),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn accepts(&self, kind: &str) -> bool {
        if self.rejected.contains(kind) {
            return false;
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        true
    }
}

impl BackendFactory for ScriptedFactory {
    fn recognizer(&self, config: &BackendConfig) -> Result<Option<Arc<dyn Recognizer>>, BackendError> {
        Ok(self
            .accepts(&config.kind)
            .then(|| Arc::new(ScriptedRecognizer::new(config.kind.clone())) as Arc<dyn Recognizer>))
    }

    fn translator(&self, config: &BackendConfig) -> Result<Option<Arc<dyn Translator>>, BackendError> {
        Ok(self
            .accepts(&config.kind)
            .then(|| Arc::new(ScriptedTranslator::new(config.kind.clone())) as Arc<dyn Translator>))
    }

    fn synthesizer(&self, config: &BackendConfig) -> Result<Option<Arc<dyn Synthesizer>>, BackendError> {
        Ok(self
            .accepts(&config.kind)
            .then(|| Arc::new(ScriptedSynthesizer::new(config.kind.clone())) as Arc<dyn Synthesizer>))
    }
}

fn stage(backends: &[(&str, i32)]) -> StageConfig {
    StageConfig {
        backends: backends
            .iter()
            .map(|(kind, priority)| BackendConfig::new(*kind, *priority))
            .collect(),
        ..Default::default()
    }
}

/// Plan for [`TEST_CLIENT`] listing `(kind, priority)` backends per stage.
pub fn plan_with(asr: &[(&str, i32)], translation: &[(&str, i32)], tts: &[(&str, i32)]) -> Plan {
    Plan {
        client_id: TEST_CLIENT.to_string(),
        plan_name: "test".to_string(),
        recognition: stage(asr),
        translation: stage(translation),
        synthesis: stage(tts),
        sla: Default::default(),
        language_policy: Default::default(),
        metadata: Default::default(),
    }
}

/// One scripted backend per stage, registered under "asr", "mt" and "tts".
pub struct ScriptedStack {
    pub recognizer: Arc<ScriptedRecognizer>,
    pub translator: Arc<ScriptedTranslator>,
    pub synthesizer: Arc<ScriptedSynthesizer>,
}

impl ScriptedStack {
    pub fn new() -> Self {
        Self {
            recognizer: Arc::new(ScriptedRecognizer::new("asr")),
            translator: Arc::new(ScriptedTranslator::new("mt")),
            synthesizer: Arc::new(ScriptedSynthesizer::new("tts")),
        }
    }

    /// Manager with this stack registered and a plan for each client id.
    pub fn manager(&self, client_ids: &[&str]) -> Arc<ProviderManager> {
        let manager = ProviderManager::new();
        let registry = manager.registry();
        registry
            .recognizers
            .register(self.recognizer.clone(), Duration::from_secs(5));
        registry
            .translators
            .register(self.translator.clone(), Duration::from_secs(5));
        registry
            .synthesizers
            .register(self.synthesizer.clone(), Duration::from_secs(5));

        for client_id in client_ids {
            let mut plan = plan_with(&[("asr", 10)], &[("mt", 10)], &[("tts", 10)]);
            plan.client_id = client_id.to_string();
            manager.register_plan(plan).expect("scripted plan registers");
        }
        Arc::new(manager)
    }
}

impl Default for ScriptedStack {
    fn default() -> Self {
        Self::new()
    }
}

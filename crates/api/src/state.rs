use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use voxrelay_config::Settings;
use voxrelay_pipeline::{
    ProcessingMode, ProviderManager, SessionConfig, VadSettings, backends::OpenAiFactory, load_plans,
};

use crate::ws::storage::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub manager: Arc<ProviderManager>,
    pub connections: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(settings: Settings, manager: Arc<ProviderManager>) -> Self {
        Self {
            settings,
            manager,
            connections: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Loads the plan file and creates every backend it names.
    ///
    /// Any plan or backend error aborts startup.
    pub fn bootstrap(settings: Settings) -> anyhow::Result<Self> {
        let plans = load_plans(&settings.plans.path)
            .with_context(|| format!("Failed to load plans from {}", settings.plans.path))?;
        let factory = OpenAiFactory::new(settings.openai.base_url.clone());
        let manager = ProviderManager::from_plans(plans, &factory).context("Failed to create backends")?;
        info!(
            clients = manager.plans().len(),
            backends = manager.infos().len(),
            "Provider manager ready"
        );
        Ok(Self::new(settings, Arc::new(manager)))
    }

    /// Mode configured as the connection default, falling back to hybrid.
    pub fn default_mode(&self) -> ProcessingMode {
        self.settings.session.default_mode.parse().unwrap_or_default()
    }

    /// Initial session state for one connection.
    pub fn session_config(&self, client_id: String, mode: ProcessingMode) -> SessionConfig {
        let session = &self.settings.session;
        SessionConfig {
            client_id,
            mode,
            source_lang: None,
            target_lang: None,
            vad: VadSettings {
                rms_threshold: session.vad_rms_threshold,
                silence_ms: session.vad_silence_ms,
                min_speech_ms: session.vad_min_speech_ms,
            },
            default_sample_rate: session.default_sample_rate,
            default_format: session.default_format.clone(),
            event_buffer: session.event_buffer,
        }
    }
}

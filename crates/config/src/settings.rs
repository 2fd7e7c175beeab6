use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub log: LogSettings,
    pub plans: PlanSettings,
    pub session: SessionSettings,
    pub health: HealthSettings,
    pub openai: OpenAiSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlanSettings {
    /// JSON file holding `{"client_plans": [...]}`.
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionSettings {
    /// Client id used when a connection does not name one.
    pub default_client_id: String,
    /// "segment", "stream" or "hybrid".
    pub default_mode: String,
    pub vad_rms_threshold: f64,
    pub vad_silence_ms: u64,
    pub vad_min_speech_ms: u64,
    pub default_sample_rate: u32,
    pub default_format: String,
    /// Outbound event queue per connection.
    pub event_buffer: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthSettings {
    /// Seconds between probes of unhealthy backends. 0 disables probing.
    pub probe_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiSettings {
    /// Default base URL for `openai_*` backends without a `base_url` option.
    pub base_url: String,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("VOXRELAY"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8080)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("log.json", false)?
            .set_default("plans.path", "config/client_plans.json")?
            .set_default("session.default_client_id", "default")?
            .set_default("session.default_mode", "hybrid")?
            .set_default("session.vad_rms_threshold", 0.08)?
            .set_default("session.vad_silence_ms", 1000)?
            .set_default("session.vad_min_speech_ms", 300)?
            .set_default("session.default_sample_rate", 16000)?
            .set_default("session.default_format", "pcm")?
            .set_default("session.event_buffer", 256)?
            .set_default("health.probe_interval_secs", 30)?
            .set_default("openai.base_url", "https://api.openai.com/v1")?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::load().expect("Failed to load default settings")
    }
}

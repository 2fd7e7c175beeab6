use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use voxrelay_api::{build_router, state::AppState};
use voxrelay_config::Settings;
use voxrelay_pipeline::ProviderManager;
use voxrelay_pipeline::testing::{ScriptedStack, TEST_CLIENT};

/// A running test application backed by scripted backends.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub settings: Settings,
    pub manager: Arc<ProviderManager>,
    pub state: AppState,
    pub client: reqwest::Client,
}

/// Settings tuned so utterances end quickly.
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.session.default_client_id = TEST_CLIENT.to_string();
    settings.session.vad_silence_ms = 60;
    settings.session.vad_min_speech_ms = 0;
    settings.health.probe_interval_secs = 0;
    settings
}

impl TestApp {
    /// Spawn a server whose only client is [`TEST_CLIENT`].
    pub async fn spawn(stack: &ScriptedStack) -> Self {
        Self::spawn_with_manager(stack.manager(&[TEST_CLIENT]), |_| {}).await
    }

    /// Spawn a server around a prebuilt manager.
    ///
    /// The `mutator` closure receives `&mut Settings` after test defaults are applied.
    pub async fn spawn_with_manager(manager: Arc<ProviderManager>, mutator: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = test_settings();
        mutator(&mut settings);

        let state = AppState::new(settings.clone(), manager.clone());
        let app = build_router(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            addr,
            base_url,
            settings,
            manager,
            state,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn ws_url(&self, query: &str) -> String {
        format!("ws://{}/ws/hybrid-asr{}", self.addr, query)
    }
}

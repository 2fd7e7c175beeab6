use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxrelay_api::{build_router, state::AppState};
use voxrelay_config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    // Load config
    let settings = Settings::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "voxrelay_api=debug,voxrelay_pipeline=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if settings.log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting VoxRelay API on {}:{}", settings.app.host, settings.app.port);

    // Plans and backends; any failure here is fatal
    let app_state = match AppState::bootstrap(settings.clone()) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Startup failed");
            return Err(e);
        }
    };

    if settings.health.probe_interval_secs > 0 {
        let manager = app_state.manager.clone();
        let period = Duration::from_secs(settings.health.probe_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately; nothing is unhealthy yet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.probe_all().await;
            }
        });
    }

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

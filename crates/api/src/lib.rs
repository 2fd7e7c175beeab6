pub mod error;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
};
use state::AppState;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if allowed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(allowed))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.app.cors_origins);

    let api = Router::new()
        .route(
            "/segment",
            post(routes::segment::process).layer(DefaultBodyLimit::max(routes::segment::MAX_SEGMENT_BYTES)),
        )
        .route("/providers/probe", post(routes::status::probe));

    // Health check
    let health = Router::new()
        .route("/health", get(health_check))
        .route("/status", get(routes::status::status));

    Router::new()
        .nest("/api", api)
        .merge(health)
        .route("/ws/hybrid-asr", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{body::Body, http::Request};
    use tower::ServiceExt;
    use voxrelay_config::Settings;
    use voxrelay_pipeline::ProviderManager;

    use super::*;

    fn router() -> Router {
        build_router(AppState::new(Settings::default(), Arc::new(ProviderManager::new())))
    }

    #[tokio::test]
    async fn health_is_ok() {
        let resp = router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn segment_rejects_non_multipart() {
        let resp = router()
            .oneshot(
                Request::post("/api/segment")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    }
}

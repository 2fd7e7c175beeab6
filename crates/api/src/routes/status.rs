use axum::{Json, extract::State};
use serde::Serialize;
use tracing::info;
use voxrelay_pipeline::provider::{BackendInfo, ProbeReport};

use crate::{state::AppState, ws::storage::ConnectionInfo};

/// A configured client and how many connections it has open.
#[derive(Debug, Serialize)]
pub struct ClientStatus {
    pub client_id: String,
    pub connections: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_connections: usize,
    pub plans: usize,
    pub clients: Vec<ClientStatus>,
    pub connections: Vec<ConnectionInfo>,
    pub backends: Vec<BackendInfo>,
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let clients = state
        .manager
        .plans()
        .client_ids()
        .into_iter()
        .map(|client_id| ClientStatus {
            connections: state.connections.count_for(&client_id),
            client_id,
        })
        .collect();
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        active_connections: state.connections.connection_count(),
        plans: state.manager.plans().len(),
        clients,
        connections: state.connections.snapshot(),
        backends: state.manager.infos(),
    })
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    pub probed: usize,
    pub healthy: usize,
    pub reports: Vec<ProbeReport>,
}

/// Health-check every backend currently marked unhealthy.
pub async fn probe(State(state): State<AppState>) -> Json<ProbeResponse> {
    let reports = state.manager.probe_all().await;
    let healthy = reports.iter().filter(|r| r.healthy).count();
    info!(probed = reports.len(), healthy, "Manual backend probe");
    Json(ProbeResponse {
        probed: reports.len(),
        healthy,
        reports,
    })
}

use axum::{
    extract::{Query, State, WebSocketUpgrade, ws::{CloseFrame, Message, WebSocket, close_code}},
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use voxrelay_pipeline::{AudioChunk, HybridSession, ProcessingMode, SessionEvent};

use super::protocol::{ClientMessage, ServerMessage};
use super::storage::ConnectionInfo;
use crate::state::AppState;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub client_id: Option<String>,
    pub mode: Option<String>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn send(sender: &WsSender, msg: &ServerMessage) -> bool {
    let mut guard = sender.lock().await;
    guard.send(Message::text(msg.to_json())).await.is_ok()
}

/// Sends one error event and closes the socket.
async fn reject(sender: &WsSender, reason: String) {
    send(sender, &ServerMessage::error(reason.clone())).await;
    let mut guard = sender.lock().await;
    let _ = guard
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: reason.into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: AppState, params: WsParams) {
    let connection_id = Uuid::new_v4().to_string();
    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    let client_id = params
        .client_id
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.settings.session.default_client_id.clone());

    if !state.manager.plans().contains(&client_id) {
        warn!(%connection_id, %client_id, "Rejecting connection for unknown client");
        reject(&sender, format!("unknown client: {client_id}")).await;
        return;
    }

    let mode = match params.mode.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(raw) => match raw.parse::<ProcessingMode>() {
            Ok(mode) => mode,
            Err(e) => {
                reject(&sender, e).await;
                return;
            }
        },
        None => state.default_mode(),
    };

    let mut config = state.session_config(client_id.clone(), mode);
    config.source_lang = params.source_lang.filter(|l| !l.trim().is_empty());
    config.target_lang = params.target_lang.filter(|l| !l.trim().is_empty());
    let mut last_rate = config.default_sample_rate;
    let mut last_format = config.default_format.clone();

    let (mut session, events) = HybridSession::new(state.manager.clone(), config);

    state.connections.add(ConnectionInfo {
        connection_id: connection_id.clone(),
        client_id: client_id.clone(),
        mode: mode.to_string(),
        connected_at: Utc::now(),
    });
    info!(%connection_id, %client_id, %mode, "WebSocket connected");

    send(
        &sender,
        &ServerMessage::Connected {
            connection_id: connection_id.clone(),
            client_id: client_id.clone(),
            mode,
        },
    )
    .await;

    let writer = tokio::spawn(write_events(events, sender.clone(), connection_id.clone()));

    // Message loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let parsed = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        debug!(%connection_id, %e, "Malformed client message");
                        send(&sender, &ServerMessage::error(format!("invalid message: {e}"))).await;
                        continue;
                    }
                };
                match parsed {
                    ClientMessage::AudioChunk {
                        audio_data,
                        sample_rate,
                        format,
                    } => {
                        let data = match STANDARD.decode(audio_data.as_bytes()) {
                            Ok(data) => data,
                            Err(e) => {
                                warn!(%connection_id, %e, "Failed to decode audio data");
                                send(&sender, &ServerMessage::error("invalid audio_data encoding")).await;
                                continue;
                            }
                        };
                        if let Some(rate) = sample_rate.filter(|r| *r > 0) {
                            last_rate = rate;
                        }
                        if let Some(fmt) = format.filter(|f| !f.is_empty()) {
                            last_format = fmt;
                        }
                        push_audio(&mut session, data, last_rate, &last_format, &connection_id);
                    }
                    ClientMessage::Config { config } => {
                        match config.map(|c| c.into_update()).transpose() {
                            Ok(update) => session.apply_config(update.unwrap_or_default()),
                            Err(e) => {
                                send(&sender, &ServerMessage::error(e)).await;
                            }
                        }
                    }
                    ClientMessage::Stop => {
                        info!(%connection_id, "Received stop signal");
                        break;
                    }
                    ClientMessage::Ping => {
                        send(&sender, &ServerMessage::Pong).await;
                    }
                }
            }
            Ok(Message::Binary(data)) => {
                push_audio(&mut session, data.to_vec(), last_rate, &last_format, &connection_id);
            }
            Ok(Message::Ping(data)) => {
                let mut guard = sender.lock().await;
                let _ = guard.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                break;
            }
            Err(e) => {
                warn!(%connection_id, %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Teardown: stop the session, then let the writer drain what was already queued.
    session.stop().await;
    drop(session);
    if let Err(e) = writer.await {
        warn!(%connection_id, %e, "Event writer task failed");
    }
    {
        let mut guard = sender.lock().await;
        let _ = guard.close().await;
    }

    state.connections.remove(&connection_id);
    info!(%connection_id, %client_id, "WebSocket disconnected");
}

fn push_audio(session: &mut HybridSession, data: Vec<u8>, sample_rate: u32, format: &str, connection_id: &str) {
    if data.is_empty() {
        return;
    }
    let chunk = AudioChunk {
        data,
        sample_rate: Some(sample_rate),
        format: Some(format.to_string()),
    };
    if let Err(e) = session.push_chunk(chunk) {
        debug!(%connection_id, %e, "Dropped audio chunk");
    }
}

/// Single writer for session events. Ends once every event sender is gone.
async fn write_events(mut events: mpsc::Receiver<SessionEvent>, sender: WsSender, connection_id: String) {
    while let Some(event) = events.recv().await {
        let msg = ServerMessage::from(event);
        if !send(&sender, &msg).await {
            debug!(%connection_id, "Socket closed, discarding remaining events");
            break;
        }
    }
}

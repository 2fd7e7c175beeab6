use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::fixtures::{audio, test_app::TestApp};
use voxrelay_pipeline::testing::ScriptedStack;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(app: &TestApp, query: &str) -> Ws {
    let (ws, _) = connect_async(app.ws_url(query)).await.expect("WebSocket connect failed");
    ws
}

/// Next JSON frame, or None once the server closes.
async fn next_json(ws: &mut Ws) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")?;
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(text.as_str()).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Reads frames until one of type `kind` arrives; returns it and everything before it.
async fn wait_for(ws: &mut Ws, kind: &str) -> (Value, Vec<Value>) {
    let mut seen = Vec::new();
    while let Some(msg) = next_json(ws).await {
        if msg["type"] == kind {
            return (msg, seen);
        }
        seen.push(msg);
    }
    panic!("connection closed before {kind}; saw {seen:?}");
}

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn send_chunk(ws: &mut Ws, pcm: Vec<u8>) {
    send_json(
        ws,
        json!({
            "type": "audio_chunk",
            "audio_data": STANDARD.encode(pcm),
            "sample_rate": 16000,
            "format": "pcm",
        }),
    )
    .await;
}

/// A short utterance followed by enough silence to end it.
async fn speak(ws: &mut Ws, chunks: usize) {
    for _ in 0..chunks {
        send_chunk(ws, audio::loud()).await;
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    send_chunk(ws, audio::silent()).await;
}

#[tokio::test]
async fn connect_sends_connected_frame() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;
    let mut ws = connect(&app, "").await;

    let hello = next_json(&mut ws).await.unwrap();
    assert_eq!(hello["type"], "connected");
    assert_eq!(hello["client_id"], "test-client");
    assert_eq!(hello["mode"], "hybrid");
    assert!(!hello["connection_id"].as_str().unwrap().is_empty());

    let resp = app.client.get(app.url("/status")).send().await.unwrap();
    let status: Value = resp.json().await.unwrap();
    assert_eq!(status["active_connections"], 1);
    assert_eq!(status["connections"][0]["client_id"], "test-client");
    assert_eq!(status["clients"][0]["client_id"], "test-client");
    assert_eq!(status["clients"][0]["connections"], 1);
}

#[tokio::test]
async fn unknown_client_is_rejected() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;
    let mut ws = connect(&app, "?client_id=nobody").await;

    let err = next_json(&mut ws).await.unwrap();
    assert_eq!(err["type"], "error");
    assert_eq!(err["error"], "unknown client: nobody");
    assert!(next_json(&mut ws).await.is_none());
    assert_eq!(app.state.connections.connection_count(), 0);
}

#[tokio::test]
async fn unknown_mode_is_rejected() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;
    let mut ws = connect(&app, "?mode=turbo").await;

    let err = next_json(&mut ws).await.unwrap();
    assert_eq!(err["type"], "error");
    assert!(err["error"].as_str().unwrap().contains("turbo"));
}

#[tokio::test]
async fn hybrid_utterance_yields_partials_and_final() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;
    let mut ws = connect(&app, "?mode=hybrid").await;
    wait_for(&mut ws, "connected").await;

    speak(&mut ws, 5).await;
    let (fin, before) = wait_for(&mut ws, "final_transcript").await;

    assert!(before.iter().any(|m| m["type"] == "partial_transcript"));
    assert_eq!(fin["transcript"], "hello world");
    assert_eq!(fin["detected_lang"], "en");
    assert_eq!(fin["translation"], "[zh] hello world");
    assert_eq!(fin["target_lang"], "zh");
    assert_eq!(fin["voice"], "nova");
    assert_eq!(fin["tts_audio_data"], "//NExA==");
    assert_eq!(fin["tts_audio_format"], "mp3");
    for key in [
        "asr_latency_ms",
        "detect_latency_ms",
        "trans_latency_ms",
        "tts_latency_ms",
        "total_latency_ms",
    ] {
        assert!(fin[key].is_u64(), "missing {key}");
    }

    // The final run got the whole utterance: five loud chunks plus the closing one.
    let whole = audio::loud().len() * 5 + audio::silent().len();
    assert!(stack.recognizer.audio_sizes().contains(&whole));
    assert_eq!(stack.translator.calls(), 1);
    assert_eq!(stack.synthesizer.calls(), 1);
}

#[tokio::test]
async fn binary_frames_in_segment_mode() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;
    let mut ws = connect(&app, "?mode=segment").await;
    wait_for(&mut ws, "connected").await;

    for _ in 0..3 {
        ws.send(Message::binary(audio::loud())).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    ws.send(Message::binary(audio::silent())).await.unwrap();

    let (fin, before) = wait_for(&mut ws, "final_transcript").await;
    assert!(before.is_empty(), "segment mode sent {before:?}");
    assert_eq!(fin["translation"], "[zh] hello world");
    assert_eq!(stack.recognizer.calls(), 1);
}

#[tokio::test]
async fn config_switches_to_stream_mode() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;
    let mut ws = connect(&app, "").await;
    wait_for(&mut ws, "connected").await;

    send_json(
        &mut ws,
        json!({"type": "config", "config": {"mode": "stream", "target_lang": "es"}}),
    )
    .await;
    speak(&mut ws, 3).await;
    let (partial, _) = wait_for(&mut ws, "partial_transcript").await;
    assert_eq!(partial["is_partial"], true);

    tokio::time::sleep(Duration::from_millis(200)).await;
    send_json(&mut ws, json!({"type": "ping"})).await;
    let (_, before) = wait_for(&mut ws, "pong").await;
    assert!(before.iter().all(|m| m["type"] != "final_transcript"));
    assert_eq!(stack.translator.calls(), 0);
    assert_eq!(stack.synthesizer.calls(), 0);
}

#[tokio::test]
async fn bad_config_and_bad_json_report_errors() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;
    let mut ws = connect(&app, "").await;
    wait_for(&mut ws, "connected").await;

    ws.send(Message::text("not json".to_string())).await.unwrap();
    let (err, _) = wait_for(&mut ws, "error").await;
    assert!(err["error"].as_str().unwrap().starts_with("invalid message"));

    send_json(&mut ws, json!({"type": "config", "config": {"mode": "turbo"}})).await;
    let (err, _) = wait_for(&mut ws, "error").await;
    assert!(err["error"].as_str().unwrap().contains("turbo"));

    send_json(&mut ws, json!({"type": "audio_chunk", "audio_data": "***"})).await;
    let (err, _) = wait_for(&mut ws, "error").await;
    assert_eq!(err["error"], "invalid audio_data encoding");
}

#[tokio::test]
async fn stop_closes_connection_and_cleans_up() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;
    let mut ws = connect(&app, "").await;
    wait_for(&mut ws, "connected").await;

    send_chunk(&mut ws, audio::loud()).await;
    send_json(&mut ws, json!({"type": "stop"})).await;

    while next_json(&mut ws).await.is_some() {}

    let mut remaining = app.state.connections.connection_count();
    for _ in 0..50 {
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        remaining = app.state.connections.connection_count();
    }
    assert_eq!(remaining, 0);
}

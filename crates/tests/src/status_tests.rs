use std::time::Duration;

use crate::fixtures::test_app::TestApp;
use serde_json::Value;
use voxrelay_pipeline::testing::{ScriptedRecognizer, ScriptedStack, TEST_CLIENT};

#[tokio::test]
async fn status_lists_plans_and_backends() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn_with_manager(stack.manager(&[TEST_CLIENT, "globex"]), |_| {}).await;

    let resp = app.client.get(app.url("/status")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();

    assert_eq!(json["active_connections"], 0);
    assert_eq!(json["plans"], 2);
    assert_eq!(
        json["clients"],
        serde_json::json!([
            {"client_id": "globex", "connections": 0},
            {"client_id": TEST_CLIENT, "connections": 0},
        ])
    );

    let backends = json["backends"].as_array().unwrap();
    assert_eq!(backends.len(), 3);
    let stages: Vec<&str> = backends.iter().map(|b| b["stage"].as_str().unwrap()).collect();
    assert!(stages.contains(&"recognition"));
    assert!(stages.contains(&"translation"));
    assert!(stages.contains(&"synthesis"));
    assert!(backends.iter().all(|b| b["status"] == "unknown"));
}

#[tokio::test]
async fn health_check_recovers_unhealthy_backend() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;

    let handle = app.manager.registry().recognizers.get("asr").unwrap();
    handle.record_outcome(Duration::from_millis(5), false, Some("connection refused"));

    let resp = app.client.post(app.url("/api/providers/probe")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["probed"], 1);
    assert_eq!(json["healthy"], 1);
    assert_eq!(json["reports"][0]["backend"], "asr");
    assert_eq!(json["reports"][0]["status"], "healthy");
    assert_eq!(stack.recognizer.health_checks(), 1);
}

#[tokio::test]
async fn failed_health_check_is_reported() {
    let stack = ScriptedStack {
        recognizer: std::sync::Arc::new(ScriptedRecognizer::new("asr").failing_health()),
        ..ScriptedStack::new()
    };
    let app = TestApp::spawn(&stack).await;

    let handle = app.manager.registry().recognizers.get("asr").unwrap();
    handle.record_outcome(Duration::from_millis(5), false, None);

    let resp = app.client.post(app.url("/api/providers/probe")).send().await.unwrap();
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["probed"], 1);
    assert_eq!(json["healthy"], 0);
    assert_eq!(json["reports"][0]["status"], "unhealthy");
    assert!(json["reports"][0]["error"].as_str().unwrap().contains("asr is down"));
}

#[tokio::test]
async fn health_check_skips_healthy_backends() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;

    let resp = app.client.post(app.url("/api/providers/probe")).send().await.unwrap();
    let json: Value = resp.json().await.unwrap();
    tokio_test::assert_ok!(serde_json::from_value::<Vec<Value>>(json["reports"].clone()));
    assert_eq!(json["probed"], 0);
    assert_eq!(stack.recognizer.health_checks(), 0);
}

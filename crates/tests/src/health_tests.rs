use crate::fixtures::test_app::TestApp;
use serde_json::Value;
use voxrelay_pipeline::testing::ScriptedStack;

#[tokio::test]
async fn health_reports_ok() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;

    let resp = app.client.get(app.url("/api/nope")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

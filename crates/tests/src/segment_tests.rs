use std::sync::Arc;

use crate::fixtures::{audio, test_app::TestApp};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use voxrelay_pipeline::BackendError;
use voxrelay_pipeline::testing::{ScriptedRecognizer, ScriptedStack};

fn audio_form() -> Form {
    Form::new().part("audio", Part::bytes(audio::loud()).file_name("segment.pcm"))
}

async fn post_segment(app: &TestApp, form: Form) -> (u16, Value) {
    let resp = app
        .client
        .post(app.url("/api/segment"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn segment_runs_full_pipeline() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;

    let (status, json) = post_segment(&app, audio_form()).await;
    assert_eq!(status, 200, "{json}");
    assert_eq!(json["source_text"], "hello world");
    assert_eq!(json["source_lang"], "en");
    assert_eq!(json["target_lang"], "zh");
    assert_eq!(json["translated_text"], "[zh] hello world");
    assert_eq!(json["voice"], "nova");
    assert_eq!(json["tts_audio"], "//NExA==");
    assert_eq!(json["tts_audio_format"], "mp3");
    assert_eq!(json["backends"]["recognition"], "asr");
    assert_eq!(json["backends"]["translation"], "mt");
    assert_eq!(json["backends"]["synthesis"], "tts");
    assert!(!json["session_id"].as_str().unwrap().is_empty());

    let diagnostics = &json["diagnostics"];
    for key in [
        "asr_latency_ms",
        "detect_latency_ms",
        "translate_latency_ms",
        "tts_latency_ms",
        "e2e_latency_ms",
    ] {
        assert!(diagnostics[key].is_u64(), "missing {key}");
    }
    assert!(diagnostics["e2e_latency_ms"].as_u64() >= diagnostics["asr_latency_ms"].as_u64());

    assert_eq!(stack.recognizer.audio_sizes(), vec![audio::loud().len()]);
    assert_eq!(stack.translator.requests(), vec![("en".to_string(), "zh".to_string())]);
}

#[tokio::test]
async fn segment_honours_target_and_session_id() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;

    let form = audio_form()
        .text("target_lang", "es")
        .text("session_id", "abc-123")
        .text("sample_rate", "48000");
    let (status, json) = post_segment(&app, form).await;
    assert_eq!(status, 200, "{json}");
    assert_eq!(json["target_lang"], "es");
    assert_eq!(json["voice"], "echo");
    assert_eq!(json["session_id"], "abc-123");
    assert_eq!(stack.synthesizer.voices(), vec!["echo".to_string()]);
}

#[tokio::test]
async fn segment_requires_audio() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;

    let (status, json) = post_segment(&app, Form::new().text("target_lang", "en")).await;
    assert_eq!(status, 400);
    assert_eq!(json["error"], "bad_request");
    assert_eq!(stack.recognizer.calls(), 0);
}

#[tokio::test]
async fn segment_rejects_bad_sample_rate() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;

    let (status, json) = post_segment(&app, audio_form().text("sample_rate", "fast")).await;
    assert_eq!(status, 400);
    assert!(json["message"].as_str().unwrap().contains("sample_rate"));
}

#[tokio::test]
async fn segment_unknown_client_is_404() {
    let stack = ScriptedStack::new();
    let app = TestApp::spawn(&stack).await;

    let (status, json) = post_segment(&app, audio_form().text("client_id", "nobody")).await;
    assert_eq!(status, 404);
    assert_eq!(json["error"], "not_found");
    assert_eq!(stack.recognizer.calls(), 0);
}

#[tokio::test]
async fn segment_without_speech_is_422() {
    let stack = ScriptedStack {
        recognizer: Arc::new(ScriptedRecognizer::new("asr").with_transcript("   ")),
        ..ScriptedStack::new()
    };
    let app = TestApp::spawn(&stack).await;

    let (status, json) = post_segment(&app, audio_form()).await;
    assert_eq!(status, 422);
    assert_eq!(json["error"], "validation");
    assert_eq!(stack.translator.calls(), 0);
}

#[tokio::test]
async fn segment_stage_failure_hides_backend_text() {
    let stack = ScriptedStack::new();
    stack
        .translator
        .push_error(BackendError::Other("secret vendor message".to_string()));
    let app = TestApp::spawn(&stack).await;

    let (status, json) = post_segment(&app, audio_form()).await;
    assert_eq!(status, 502);
    assert_eq!(json["error"], "bad_gateway");
    assert_eq!(json["message"], "translation failed");
    assert_eq!(stack.synthesizer.calls(), 0);
}

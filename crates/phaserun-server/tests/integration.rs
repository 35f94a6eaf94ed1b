use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use http_body_util::BodyExt;
use phaserun_core::PhaseStatus;
use phaserun_engine::{Initialization, Orchestrator, RunContext};
use phaserun_server::{build_router, AppState};
use phaserun_stream::{Script, ScriptedTransport};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn plan() -> Value {
    json!({"phases": [
        {"number": 1, "title": "Scaffold"},
        {"number": 2, "title": "Schema"}
    ]})
}

fn done(content: &str) -> Script {
    Script::new()
        .record(&json!({"content": content}).to_string())
        .record(r#"{"done":true}"#)
}

fn app_with(transport: ScriptedTransport, dir: &TempDir) -> (axum::Router, Orchestrator) {
    let orch = Orchestrator::new(Arc::new(transport), RunContext::new("demo"));
    orch.initialize(Initialization::Plan(plan())).unwrap();
    let router = build_router(AppState::new(dir.path().to_path_buf(), orch.clone()));
    (router, orch)
}

/// Send a request via `oneshot` and return (status, parsed JSON body).
async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&b).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn wait_for_status(orch: &Orchestrator, number: u32, status: PhaseStatus) {
    let mut rx = orch.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|phases| phases.iter().any(|p| p.number == number && p.status == status)),
    )
    .await
    .expect("timed out waiting for phase status")
    .unwrap();
}

async fn wait_idle(orch: &Orchestrator) {
    for _ in 0..500 {
        if orch.is_idle() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("orchestrator never went idle");
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_phases_returns_snapshot_and_summary() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app_with(ScriptedTransport::new(), &dir);
    let (status, body) = send(app, "GET", "/api/phases", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phases"].as_array().unwrap().len(), 2);
    assert_eq!(body["phases"][0]["status"], "queued");
    assert_eq!(body["summary"]["total"], 2);
    assert_eq!(body["idle"], true);
    assert_eq!(body["concurrency"], 3);
}

#[tokio::test]
async fn run_starts_everything_in_background() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new()
        .script(1, done("one"))
        .script(2, Script::new().record(r#"{"error":"bad schema"}"#));
    let (app, orch) = app_with(transport, &dir);

    let (status, body) = send(app.clone(), "POST", "/api/run", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");

    wait_for_status(&orch, 1, PhaseStatus::Complete).await;
    wait_for_status(&orch, 2, PhaseStatus::Failed).await;
    wait_idle(&orch).await;

    let (_, body) = send(app, "GET", "/api/phases", None).await;
    assert_eq!(body["phases"][0]["output"], "one");
    assert_eq!(body["phases"][1]["error"], "bad schema");
    assert_eq!(body["summary"]["failed"], 1);
}

#[tokio::test]
async fn pause_and_resume_round_trip() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new()
        .script(1, Script::new().hang())
        .script(1, done("resumed"))
        .script(2, done("two"));
    let (app, orch) = app_with(transport, &dir);

    send(app.clone(), "POST", "/api/run", None).await;
    wait_for_status(&orch, 2, PhaseStatus::Complete).await;

    let (status, body) = send(app.clone(), "POST", "/api/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paused"], 1);
    let paused = &orch.snapshot()[0];
    assert_eq!(paused.status, PhaseStatus::Queued);
    assert!(paused.output.ends_with("[Paused]"));

    let (status, _) = send(app, "POST", "/api/resume", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_status(&orch, 1, PhaseStatus::Complete).await;
    assert_eq!(orch.snapshot()[0].output, "resumed");
}

#[tokio::test]
async fn per_phase_commands() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new()
        .script(1, Script::new().hang())
        .script(1, done("again"));
    let (app, orch) = app_with(transport, &dir);

    let (status, body) = send(app.clone(), "POST", "/api/phases/1/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["started"], true);

    let (status, _) = send(app.clone(), "POST", "/api/phases/1/retry", None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(app.clone(), "POST", "/api/phases/1/pause", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paused"], true);

    let (status, body) = send(app.clone(), "POST", "/api/phases/1/retry", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    wait_for_status(&orch, 1, PhaseStatus::Complete).await;

    let (status, _) = send(app, "POST", "/api/phases/9/start", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn run_without_plan_is_bad_request() {
    let dir = TempDir::new().unwrap();
    let orch = Orchestrator::new(Arc::new(ScriptedTransport::new()), RunContext::new("demo"));
    let app = build_router(AppState::new(dir.path().to_path_buf(), orch));
    let (status, body) = send(app, "POST", "/api/run", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("no plan"));
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn events_stream_starts_with_current_snapshot() {
    let dir = TempDir::new().unwrap();
    let (app, _) = app_with(ScriptedTransport::new(), &dir);
    let req = axum::http::Request::builder()
        .uri("/api/phases/events")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let ct = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(ct.starts_with("text/event-stream"));

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: phases"));
    assert!(text.contains("\"title\":\"Scaffold\""));
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn checkpoint_save_list_restore() {
    let dir = TempDir::new().unwrap();
    let transport = ScriptedTransport::new()
        .script(1, done("kept"))
        .script(2, Script::new().hang());
    let (app, orch) = app_with(transport, &dir);

    send(app.clone(), "POST", "/api/run", None).await;
    wait_for_status(&orch, 1, PhaseStatus::Complete).await;
    wait_for_status(&orch, 2, PhaseStatus::Running).await;

    let (status, meta) = send(
        app.clone(),
        "POST",
        "/api/checkpoints",
        Some(json!({"name": "mid-run"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(meta["name"], "mid-run");
    assert_eq!(meta["project_name"], "demo");
    let id = meta["id"].as_str().unwrap().to_string();

    let (status, list) = send(app.clone(), "GET", "/api/checkpoints", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    // restoring while phase 2 still runs is refused
    let uri = format!("/api/checkpoints/{id}/restore");
    let (status, _) = send(app.clone(), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(app.clone(), "POST", "/api/pause", None).await;
    let (status, body) = send(app.clone(), "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phases"][0]["status"], "complete");
    assert_eq!(body["phases"][0]["output"], "kept");
    assert_eq!(body["phases"][1]["status"], "queued", "running comes back queued");
    assert!(orch.is_idle());

    let bogus = format!("/api/checkpoints/{}/restore", "00000000-0000-4000-8000-000000000000");
    let (status, _) = send(app, "POST", &bogus, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use phaserun_core::PipelineError;
use phaserun_engine::Orchestrator;
use tracing::{error, info};

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/phases: current snapshot plus run-level summary.
pub async fn get_phases(State(app): State<AppState>) -> Json<serde_json::Value> {
    let orch = &app.orchestrator;
    Json(serde_json::json!({
        "phases": orch.snapshot(),
        "summary": orch.summary(),
        "idle": orch.is_idle(),
        "concurrency": orch.context().concurrency,
    }))
}

/// Kick off `run_all` in the background; the SSE feed reports progress.
fn spawn_run(orch: &Orchestrator, label: &'static str) -> Result<(), AppError> {
    if orch.plan().is_none() {
        return Err(PipelineError::NoPlan.into());
    }
    let orch = orch.clone();
    tokio::spawn(async move {
        match orch.run_all().await {
            Ok(report) => info!(
                trigger = label,
                complete = report.complete.len(),
                failed = report.failed.len(),
                queued = report.queued.len(),
                "background run settled"
            ),
            Err(e) => error!(trigger = label, error = %e, "background run failed to start"),
        }
    });
    Ok(())
}

/// POST /api/run: start every phase that is not complete.
pub async fn run_all(
    State(app): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    spawn_run(&app.orchestrator, "run")?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "started" })),
    ))
}

/// POST /api/resume: same as run; already complete phases are left alone.
pub async fn resume(
    State(app): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    spawn_run(&app.orchestrator, "resume")?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "started" })),
    ))
}

/// POST /api/pause: cancel all running phases and wait for them to settle.
pub async fn pause(State(app): State<AppState>) -> Json<serde_json::Value> {
    let paused = app.orchestrator.pause().await;
    Json(serde_json::json!({ "paused": paused }))
}

/// POST /api/phases/{n}/start
pub async fn start_phase(
    State(app): State<AppState>,
    Path(number): Path<u32>,
) -> Result<Json<serde_json::Value>, AppError> {
    let started = app.orchestrator.start(number)?;
    Ok(Json(serde_json::json!({ "phase": number, "started": started })))
}

/// POST /api/phases/{n}/pause
pub async fn pause_phase(
    State(app): State<AppState>,
    Path(number): Path<u32>,
) -> Result<Json<serde_json::Value>, AppError> {
    let paused = app.orchestrator.pause_phase(number).await?;
    Ok(Json(serde_json::json!({ "phase": number, "paused": paused })))
}

/// POST /api/phases/{n}/retry: regenerate the phase from scratch.
pub async fn retry_phase(
    State(app): State<AppState>,
    Path(number): Path<u32>,
) -> Result<Json<serde_json::Value>, AppError> {
    app.orchestrator.retry(number)?;
    Ok(Json(serde_json::json!({ "phase": number, "status": "running" })))
}

use axum::extract::{Path, State};
use axum::Json;
use phaserun_engine::Initialization;
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SaveCheckpointBody {
    pub name: String,
}

/// GET /api/checkpoints: newest first.
pub async fn list_checkpoints(
    State(app): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let metas = tokio::task::spawn_blocking(move || store.list())
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(serde_json::json!(metas)))
}

/// POST /api/checkpoints: save the current phases under `name`.
pub async fn save_checkpoint(
    State(app): State<AppState>,
    Json(body): Json<SaveCheckpointBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let full = app.orchestrator.full_state(app.stage)?;
    let store = app.store.clone();
    let meta = tokio::task::spawn_blocking(move || store.save(&body.name, &full))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(Json(serde_json::json!(meta)))
}

/// POST /api/checkpoints/{id}/restore: replace the phases with the saved
/// ones. Nothing is started; call /api/resume for that.
pub async fn restore_checkpoint(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    let lookup = id.clone();
    let full = tokio::task::spawn_blocking(move || store.load(&lookup))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    app.orchestrator.initialize(Initialization::from(full))?;
    info!(id = %id, "checkpoint restored");
    Ok(Json(serde_json::json!({
        "id": id,
        "phases": app.orchestrator.snapshot(),
    })))
}

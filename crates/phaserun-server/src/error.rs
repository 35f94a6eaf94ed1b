use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use phaserun_core::PipelineError;

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        let Some(e) = self.0.downcast_ref::<PipelineError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match e {
            PipelineError::PhaseNotFound(_) | PipelineError::CheckpointNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            PipelineError::PhaseRunning(_) | PipelineError::Busy(_) => StatusCode::CONFLICT,
            PipelineError::NotInitialized
            | PipelineError::NoPlan
            | PipelineError::InvalidPlan(_)
            | PipelineError::InvalidTransition { .. }
            | PipelineError::InvalidStage(_)
            | PipelineError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            PipelineError::Io(_) | PipelineError::Yaml(_) | PipelineError::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %format!("{:#}", self.0), "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

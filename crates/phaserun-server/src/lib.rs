//! HTTP surface over a phase [`Orchestrator`](phaserun_engine::Orchestrator):
//! JSON snapshots, an SSE snapshot feed, run/pause/resume commands and
//! checkpoint save/restore.

pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Phases
        .route("/api/phases", get(routes::phases::get_phases))
        .route("/api/phases/events", get(routes::events::phase_events))
        .route("/api/phases/{n}/start", post(routes::phases::start_phase))
        .route("/api/phases/{n}/pause", post(routes::phases::pause_phase))
        .route("/api/phases/{n}/retry", post(routes::phases::retry_phase))
        // Run control
        .route("/api/run", post(routes::phases::run_all))
        .route("/api/pause", post(routes::phases::pause))
        .route("/api/resume", post(routes::phases::resume))
        // Checkpoints
        .route(
            "/api/checkpoints",
            get(routes::checkpoints::list_checkpoints).post(routes::checkpoints::save_checkpoint),
        )
        .route(
            "/api/checkpoints/{id}/restore",
            post(routes::checkpoints::restore_checkpoint),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the server on `0.0.0.0:<port>`.
pub async fn serve(app_state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(app_state, listener).await
}

/// Start the server on a pre-bound listener.
///
/// The caller can read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(app_state: AppState, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    let app = build_router(app_state);
    tracing::info!("phaserun server listening on http://localhost:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}

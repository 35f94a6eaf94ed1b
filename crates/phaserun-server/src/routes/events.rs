use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/phases/events: SSE stream emitting the full phase list as a
/// `phases` event, once on connect and again after every change. Slow
/// readers skip intermediate snapshots and always see the latest one.
pub async fn phase_events(State(app): State<AppState>) -> impl axum::response::IntoResponse {
    let stream = WatchStream::new(app.orchestrator.subscribe())
        .map(|phases| Event::default().event("phases").json_data(&phases));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

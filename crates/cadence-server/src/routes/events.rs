use axum::extract::{Extension, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use cadence_core::types::Permission;

use crate::auth::Principal;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/events: SSE stream of release events, one message per event
/// named after it (`releases.publish`).
pub async fn sse_events(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Permission::Read)?;
    let rx = app.service.events().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        let event = msg.ok()?;
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok::<Event, Infallible>(
            Event::default().event(event.event.clone()).data(data),
        ))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /api/health: liveness plus scheduler size.
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "project": app.config.project.name,
        "scheduledJobs": app.service.scheduler().jobs().len(),
    }))
}

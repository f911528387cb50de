use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use cadence_core::pagination::{PageQuery, Pagination};
use cadence_core::release::{ActionUpdate, NewAction};
use cadence_core::service::GroupBy;
use cadence_core::types::{ActionId, Permission, ReleaseId};

use super::blocking;
use crate::auth::Principal;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionListQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub group_by: Option<String>,
}

/// POST /api/releases/{id}/actions
pub async fn create_action(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(release_id): Path<ReleaseId>,
    Json(body): Json<NewAction>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    principal.require(Permission::CreateAction)?;
    let service = app.service.clone();
    let action = blocking(move || service.create_action(release_id, body)).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "data": action })),
    ))
}

/// POST /api/releases/{id}/actions/bulk: entries already on the release are
/// skipped and counted.
pub async fn create_many_actions(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(release_id): Path<ReleaseId>,
    Json(body): Json<Vec<NewAction>>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    principal.require(Permission::CreateAction)?;
    let service = app.service.clone();
    let outcome = blocking(move || service.create_many(release_id, body)).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "data": outcome.created,
            "meta": {
                "entriesAlreadyInRelease": outcome.entries_already_in_release,
                "totalEntries": outcome.total_entries,
            },
        })),
    ))
}

/// GET /api/releases/{id}/actions: grouped, paginated actions.
pub async fn list_actions(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(release_id): Path<ReleaseId>,
    Query(query): Query<ActionListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    principal.require(Permission::Read)?;
    let group_by = match query.group_by.as_deref() {
        Some(raw) => raw.parse::<GroupBy>().unwrap_or_default(),
        None => GroupBy::default(),
    };
    let pagination = Pagination::from_query(&query.page, app.service.api_config())?;
    let service = app.service.clone();
    let page = blocking(move || service.find_actions(release_id, group_by, pagination)).await?;
    Ok(Json(serde_json::json!({
        "data": page.groups,
        "meta": {
            "pagination": page.pagination,
            "contentTypes": page.content_types,
        },
    })))
}

/// PUT /api/releases/{id}/actions/{action_id}: change the action type.
pub async fn update_action(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((release_id, action_id)): Path<(ReleaseId, ActionId)>,
    Json(body): Json<ActionUpdate>,
) -> Result<Json<serde_json::Value>, AppError> {
    principal.require(Permission::Update)?;
    let service = app.service.clone();
    let action = blocking(move || service.update_action(action_id, release_id, body)).await?;
    Ok(Json(serde_json::json!({ "data": action })))
}

/// DELETE /api/releases/{id}/actions/{action_id}
pub async fn delete_action(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((release_id, action_id)): Path<(ReleaseId, ActionId)>,
) -> Result<Json<serde_json::Value>, AppError> {
    principal.require(Permission::DeleteAction)?;
    let service = app.service.clone();
    let action = blocking(move || service.delete_action(action_id, release_id)).await?;
    Ok(Json(serde_json::json!({ "data": action })))
}

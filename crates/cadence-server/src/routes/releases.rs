use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use cadence_core::pagination::{parse_flag, PageQuery, Pagination};
use cadence_core::release::{NewRelease, ReleaseUpdate};
use cadence_core::service::ReleaseSort;
use cadence_core::types::{EntryId, Permission, ReleaseId};

use super::blocking;
use crate::auth::Principal;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub released: Option<String>,
    pub sort: Option<String>,
    pub content_type_uid: Option<String>,
    pub entry_id: Option<String>,
    pub has_entry_attached: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapQuery {
    pub content_type_uid: String,
    #[serde(default)]
    pub entries_ids: String,
}

fn parse_entry_id(raw: &str) -> Result<EntryId, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("Invalid entry id: {raw}")))
}

/// GET /api/releases: a page of releases, or with `contentTypeUid` and
/// `entryId` the pending releases that do (or do not) contain that entry.
pub async fn list_releases(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    principal.require(Permission::Read)?;

    if let Some(uid) = query.content_type_uid {
        let entry_id = query
            .entry_id
            .as_deref()
            .ok_or_else(|| AppError::bad_request("entryId is required with contentTypeUid"))
            .and_then(parse_entry_id)?;
        let attached = match query.has_entry_attached.as_deref() {
            Some(v) => parse_flag("hasEntryAttached", v)?,
            None => false,
        };
        let service = app.service.clone();
        let data = if attached {
            let found =
                blocking(move || service.find_many_with_entry_attached(&uid, &[entry_id])).await?;
            serde_json::to_value(found)?
        } else {
            let found =
                blocking(move || service.find_many_without_entry_attached(&uid, entry_id)).await?;
            serde_json::to_value(found)?
        };
        return Ok(Json(serde_json::json!({ "data": data })));
    }

    let released = query
        .released
        .as_deref()
        .map(|v| parse_flag("released", v))
        .transpose()?;
    let sort = match query.sort.as_deref() {
        Some(s) => s.parse::<ReleaseSort>()?,
        None => ReleaseSort::default(),
    };
    let pagination = Pagination::from_query(&query.page, app.service.api_config())?;
    let service = app.service.clone();
    let page = blocking(move || service.find_page(released, sort, pagination)).await?;

    Ok(Json(serde_json::json!({
        "data": page.results,
        "meta": {
            "pagination": page.pagination,
            "pendingReleasesCount": page.pending_releases_count,
        },
    })))
}

/// GET /api/releases/mapEntriesToReleases
pub async fn map_entries_to_releases(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<MapQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    principal.require(Permission::Read)?;
    let ids = query
        .entries_ids
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(parse_entry_id)
        .collect::<Result<Vec<_>, _>>()?;
    let service = app.service.clone();
    let uid = query.content_type_uid;
    let map = blocking(move || service.map_entries_to_releases(&uid, &ids)).await?;
    Ok(Json(serde_json::json!({ "data": map })))
}

/// POST /api/releases
pub async fn create_release(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewRelease>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    principal.require(Permission::Create)?;
    let service = app.service.clone();
    let actor = principal.name.clone();
    let release = blocking(move || service.create(body, actor.as_deref())).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "data": release })),
    ))
}

/// GET /api/releases/{id}: the release with its action count.
pub async fn get_release(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ReleaseId>,
) -> Result<Json<serde_json::Value>, AppError> {
    principal.require(Permission::Read)?;
    let service = app.service.clone();
    let (summary, meta) = blocking(move || {
        let summary = service.find_one_with_count(id)?;
        let meta = service.publish_meta(id)?;
        Ok((summary, meta))
    })
    .await?;
    Ok(Json(serde_json::json!({ "data": summary, "meta": meta })))
}

/// PUT /api/releases/{id}
pub async fn update_release(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ReleaseId>,
    Json(body): Json<ReleaseUpdate>,
) -> Result<Json<serde_json::Value>, AppError> {
    principal.require(Permission::Update)?;
    let service = app.service.clone();
    let actor = principal.name.clone();
    let release = blocking(move || service.update(id, body, actor.as_deref())).await?;
    Ok(Json(serde_json::json!({ "data": release })))
}

/// DELETE /api/releases/{id}
pub async fn delete_release(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ReleaseId>,
) -> Result<Json<serde_json::Value>, AppError> {
    principal.require(Permission::Delete)?;
    let service = app.service.clone();
    let release = blocking(move || service.delete(id)).await?;
    Ok(Json(serde_json::json!({ "data": release })))
}

/// POST /api/releases/{id}/publish
pub async fn publish_release(
    State(app): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<ReleaseId>,
) -> Result<Json<serde_json::Value>, AppError> {
    principal.require(Permission::Publish)?;
    let service = app.service.clone();
    let published = blocking(move || service.publish(id)).await?;
    Ok(Json(serde_json::json!({
        "data": published.release,
        "meta": published.meta,
    })))
}

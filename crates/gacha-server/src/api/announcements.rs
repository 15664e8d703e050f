use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, required_text, ApiError, ApiResponse, AppState};

const MAX_TITLE_CHARS: usize = 200;
const MAX_BODY_CHARS: usize = 10_000;

#[derive(Debug, Serialize)]
pub(super) struct AnnouncementItem {
    id: i64,
    title: String,
    body: String,
    is_published: bool,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<gacha_db::AnnouncementRow> for AnnouncementItem {
    fn from(row: gacha_db::AnnouncementRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            body: row.body,
            is_published: row.is_published,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateAnnouncementRequest {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateAnnouncementRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    pub is_published: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(super) struct AnnouncementQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/announcements: published announcements, newest first.
pub(super) async fn list_published(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiQuery(query): ApiQuery<AnnouncementQuery>,
) -> Result<Json<ApiResponse<Vec<AnnouncementItem>>>, ApiError> {
    let rows = gacha_db::list_published_announcements(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(AnnouncementItem::from).collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn list_all(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<AnnouncementItem>>>, ApiError> {
    let rows = gacha_db::list_announcements(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(AnnouncementItem::from).collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn create(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<CreateAnnouncementRequest>,
) -> Result<(StatusCode, Json<ApiResponse<AnnouncementItem>>), ApiError> {
    let rid = &req_id.0;
    let title = required_text(rid, "title", &body.title, MAX_TITLE_CHARS)?;
    let text = required_text(rid, "body", &body.body, MAX_BODY_CHARS)?;

    let row = gacha_db::create_announcement(&state.pool, &title, &text, body.is_published)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(AnnouncementItem::from(row), req_id.0)),
    ))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(announcement_id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateAnnouncementRequest>,
) -> Result<Json<ApiResponse<AnnouncementItem>>, ApiError> {
    let rid = &req_id.0;
    let title = body
        .title
        .as_deref()
        .map(|t| required_text(rid, "title", t, MAX_TITLE_CHARS))
        .transpose()?;
    let text = body
        .body
        .as_deref()
        .map(|b| required_text(rid, "body", b, MAX_BODY_CHARS))
        .transpose()?;

    let row = gacha_db::update_announcement(
        &state.pool,
        announcement_id,
        &gacha_db::AnnouncementPatch {
            title: title.as_deref(),
            body: text.as_deref(),
            is_published: body.is_published,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(AnnouncementItem::from(row), req_id.0)))
}

pub(super) async fn remove(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(announcement_id): ApiPath<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    gacha_db::delete_announcement(&state.pool, announcement_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        serde_json::json!({ "deleted": true }),
        req_id.0,
    )))
}

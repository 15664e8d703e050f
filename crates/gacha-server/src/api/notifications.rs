//! Admin push-notification handlers. Delivery itself happens in the
//! scheduler's dispatch job.

use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use gacha_core::NotificationStatus;
use serde::{Deserialize, Serialize};

use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequestId;

use super::{map_db_error, required_text, validation_error, ApiError, ApiResponse, AppState};

const MAX_TITLE_CHARS: usize = 100;
const MAX_BODY_CHARS: usize = 1_000;

#[derive(Debug, Serialize)]
pub(super) struct NotificationItem {
    id: i64,
    title: String,
    body: String,
    target_url: Option<String>,
    status: String,
    scheduled_at: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<gacha_db::NotificationRow> for NotificationItem {
    fn from(row: gacha_db::NotificationRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            body: row.body,
            target_url: row.target_url,
            status: row.status,
            scheduled_at: row.scheduled_at,
            sent_at: row.sent_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateNotificationRequest {
    pub title: String,
    pub body: String,
    pub target_url: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[allow(clippy::option_option)]
#[derive(Debug, Deserialize)]
pub(super) struct UpdateNotificationRequest {
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(default, deserialize_with = "super::deserialize_some")]
    pub target_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "super::deserialize_some")]
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct NotificationQuery {
    pub status: Option<String>,
}

fn reject_past(req_id: &str, scheduled_at: Option<DateTime<Utc>>) -> Result<(), ApiError> {
    match scheduled_at {
        Some(at) if at < Utc::now() => Err(validation_error(
            req_id,
            "scheduled_at must not be in the past",
        )),
        _ => Ok(()),
    }
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<Json<ApiResponse<Vec<NotificationItem>>>, ApiError> {
    let rid = &req_id.0;
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<NotificationStatus>()
                .map_err(|e| validation_error(rid, e.to_string()))
        })
        .transpose()?;

    let rows = gacha_db::list_notifications(&state.pool, status)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let data = rows.into_iter().map(NotificationItem::from).collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// POST /api/v1/admin/notifications: create a draft, or a scheduled
/// notification when `scheduled_at` is given.
pub(super) async fn create(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<NotificationItem>>), ApiError> {
    let rid = &req_id.0;
    let title = required_text(rid, "title", &body.title, MAX_TITLE_CHARS)?;
    let text = required_text(rid, "body", &body.body, MAX_BODY_CHARS)?;
    reject_past(rid, body.scheduled_at)?;

    let row = gacha_db::create_notification(
        &state.pool,
        &gacha_db::NewNotification {
            title: &title,
            body: &text,
            target_url: body.target_url.as_deref(),
            scheduled_at: body.scheduled_at,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(NotificationItem::from(row), req_id.0)),
    ))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(notification_id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateNotificationRequest>,
) -> Result<Json<ApiResponse<NotificationItem>>, ApiError> {
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
    reject_past(rid, body.scheduled_at.flatten())?;

    let row = gacha_db::update_notification(
        &state.pool,
        notification_id,
        &gacha_db::NotificationPatch {
            title: title.as_deref(),
            body: text.as_deref(),
            target_url: body.target_url.as_ref().map(|opt| opt.as_deref()),
            scheduled_at: body.scheduled_at,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(NotificationItem::from(row), req_id.0)))
}

pub(super) async fn cancel(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(notification_id): ApiPath<i64>,
) -> Result<Json<ApiResponse<NotificationItem>>, ApiError> {
    let row = gacha_db::cancel_notification(&state.pool, notification_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(NotificationItem::from(row), req_id.0)))
}

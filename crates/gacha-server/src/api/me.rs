//! Handlers for the authenticated player's own data.

use axum::{
    extract::State,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::extract::ApiQuery;
use crate::middleware::{CurrentUser, RequestId};

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct ProfileItem {
    id: i64,
    display_name: String,
    free_points: i64,
    paid_points: i64,
    total_points: i64,
    level: i32,
    total_draws: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct OwnedCardItem {
    card_id: i64,
    name: String,
    rarity: String,
    image_url: Option<String>,
    quantity: i32,
    first_obtained_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct HistoryItem {
    id: i64,
    product_id: i64,
    card_id: i64,
    card_name: String,
    rarity: String,
    batch_id: Uuid,
    draw_index: i32,
    is_pickup: bool,
    was_guaranteed: bool,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct TransactionItem {
    id: i64,
    kind: String,
    free_delta: i64,
    paid_delta: i64,
    balance_after: i64,
    batch_id: Option<Uuid>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(super) struct InboxItem {
    id: i64,
    title: String,
    body: String,
    target_url: Option<String>,
    sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LimitQuery {
    pub limit: Option<i64>,
}

pub(super) async fn get_me(
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<ApiResponse<ProfileItem>> {
    let total_points = user.balance().total();
    Json(ApiResponse::new(
        ProfileItem {
            id: user.id,
            display_name: user.display_name,
            free_points: user.free_points,
            paid_points: user.paid_points,
            total_points,
            level: user.level,
            total_draws: user.total_draws,
            created_at: user.created_at,
        },
        req_id.0,
    ))
}

pub(super) async fn list_my_cards(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<OwnedCardItem>>>, ApiError> {
    let rows = gacha_db::list_user_cards(&state.pool, user.id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| OwnedCardItem {
            card_id: row.card_id,
            name: row.name,
            rarity: row.rarity,
            image_url: row.image_url,
            quantity: row.quantity,
            first_obtained_at: row.first_obtained_at,
        })
        .collect();

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn list_my_history(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<HistoryItem>>>, ApiError> {
    let rows = gacha_db::list_results_for_user(&state.pool, user.id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| HistoryItem {
            id: row.id,
            product_id: row.product_id,
            card_id: row.card_id,
            card_name: row.card_name,
            rarity: row.rarity,
            batch_id: row.draw_batch_id,
            draw_index: row.draw_index,
            is_pickup: row.is_pickup,
            was_guaranteed: row.was_guaranteed,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn list_my_transactions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<TransactionItem>>>, ApiError> {
    let rows = gacha_db::list_transactions(&state.pool, user.id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| TransactionItem {
            id: row.id,
            kind: row.kind,
            free_delta: row.free_delta,
            paid_delta: row.paid_delta,
            balance_after: row.balance_after,
            batch_id: row.draw_batch_id,
            note: row.note,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn list_my_notifications(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<Json<ApiResponse<Vec<InboxItem>>>, ApiError> {
    let rows = gacha_db::list_sent_notifications(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| InboxItem {
            id: row.id,
            title: row.title,
            body: row.body,
            target_url: row.target_url,
            sent_at: row.sent_at,
        })
        .collect();

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

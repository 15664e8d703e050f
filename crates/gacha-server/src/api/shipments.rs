//! Shipment handlers: players request physical delivery of owned cards,
//! admins move requests through the status machine.

use std::collections::HashMap;

use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use gacha_core::{ShipmentLine, ShipmentStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::{CurrentUser, RequestId};

use super::{
    map_db_error, normalize_limit, required_text, validation_error, ApiError, ApiResponse,
    AppState,
};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct ShipmentItemRequest {
    pub card_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateShipmentRequest {
    pub recipient_name: String,
    pub postal_code: String,
    pub address: String,
    pub phone: Option<String>,
    pub items: Vec<ShipmentItemRequest>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateStatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ShipmentListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct ShipmentItem {
    card_id: i64,
    name: String,
    rarity: String,
    quantity: i32,
}

#[derive(Debug, Serialize)]
pub(super) struct ShipmentDetail {
    id: i64,
    public_id: Uuid,
    user_id: i64,
    status: String,
    recipient_name: String,
    postal_code: String,
    address: String,
    phone: Option<String>,
    tracking_number: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    items: Vec<ShipmentItem>,
}

/// Attaches item lines to each shipment row with a single extra query.
async fn with_items(
    state: &AppState,
    req_id: &str,
    rows: Vec<gacha_db::ShipmentRow>,
) -> Result<Vec<ShipmentDetail>, ApiError> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let items = gacha_db::list_shipment_items(&state.pool, &ids)
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?;

    let mut by_shipment: HashMap<i64, Vec<ShipmentItem>> = HashMap::new();
    for item in items {
        by_shipment
            .entry(item.shipment_id)
            .or_default()
            .push(ShipmentItem {
                card_id: item.card_id,
                name: item.name,
                rarity: item.rarity,
                quantity: item.quantity,
            });
    }

    Ok(rows
        .into_iter()
        .map(|row| ShipmentDetail {
            items: by_shipment.remove(&row.id).unwrap_or_default(),
            id: row.id,
            public_id: row.public_id,
            user_id: row.user_id,
            status: row.status,
            recipient_name: row.recipient_name,
            postal_code: row.postal_code,
            address: row.address,
            phone: row.phone,
            tracking_number: row.tracking_number,
            shipped_at: row.shipped_at,
            created_at: row.created_at,
        })
        .collect())
}

fn parse_status(req_id: &str, value: &str) -> Result<ShipmentStatus, ApiError> {
    value
        .parse::<ShipmentStatus>()
        .map_err(|e| validation_error(req_id, e.to_string()))
}

// ---------------------------------------------------------------------------
// Player handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/shipments: request delivery of owned cards.
pub(super) async fn request_shipment(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(body): ApiJson<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ShipmentDetail>>), ApiError> {
    let rid = &req_id.0;
    let recipient_name = required_text(rid, "recipient_name", &body.recipient_name, 100)?;
    let postal_code = required_text(rid, "postal_code", &body.postal_code, 16)?;
    let address = required_text(rid, "address", &body.address, 500)?;

    let row = gacha_db::create_shipment(
        &state.pool,
        &gacha_db::NewShipment {
            user_id: user.id,
            recipient_name: &recipient_name,
            postal_code: &postal_code,
            address: &address,
            phone: body.phone.as_deref(),
            lines: body
                .items
                .iter()
                .map(|i| ShipmentLine {
                    card_id: i.card_id,
                    quantity: i.quantity,
                })
                .collect(),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let mut detail = with_items(&state, rid, vec![row]).await?;
    let data = detail
        .pop()
        .ok_or_else(|| ApiError::new(rid, "internal_error", "shipment vanished after insert"))?;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(data, req_id.0))))
}

pub(super) async fn list_my_shipments(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<ShipmentDetail>>>, ApiError> {
    let rid = &req_id.0;
    let rows = gacha_db::list_shipments_for_user(&state.pool, user.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let data = with_items(&state, rid, rows).await?;

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// GET /api/v1/me/shipments/:id: one of the caller's own shipments. Other
/// players' shipments read as not found.
pub(super) async fn get_my_shipment(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(shipment_id): ApiPath<i64>,
) -> Result<Json<ApiResponse<ShipmentDetail>>, ApiError> {
    let rid = &req_id.0;
    let row = gacha_db::get_shipment(&state.pool, shipment_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .filter(|row| row.user_id == user.id)
        .ok_or_else(|| {
            ApiError::new(rid, "not_found", format!("shipment {shipment_id} not found"))
        })?;

    let mut detail = with_items(&state, rid, vec![row]).await?;
    let data = detail
        .pop()
        .ok_or_else(|| ApiError::new(rid, "internal_error", "shipment vanished after lookup"))?;

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

// ---------------------------------------------------------------------------
// Admin handlers
// ---------------------------------------------------------------------------

pub(super) async fn list_shipments(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiQuery(query): ApiQuery<ShipmentListQuery>,
) -> Result<Json<ApiResponse<Vec<ShipmentDetail>>>, ApiError> {
    let rid = &req_id.0;
    let status = query
        .status
        .as_deref()
        .map(|s| parse_status(rid, s))
        .transpose()?;

    let rows = gacha_db::list_shipments(&state.pool, status, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let data = with_items(&state, rid, rows).await?;

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// PUT /api/v1/admin/shipments/:id/status: advance or cancel a shipment.
pub(super) async fn update_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(shipment_id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<ShipmentDetail>>, ApiError> {
    let rid = &req_id.0;
    let next = parse_status(rid, &body.status)?;

    let row = gacha_db::update_shipment_status(
        &state.pool,
        shipment_id,
        next,
        body.tracking_number.as_deref(),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let mut detail = with_items(&state, rid, vec![row]).await?;
    let data = detail
        .pop()
        .ok_or_else(|| ApiError::new(rid, "internal_error", "shipment vanished after update"))?;

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

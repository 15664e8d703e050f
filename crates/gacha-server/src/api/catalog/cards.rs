use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::RequestId;

use super::super::{
    map_db_error, normalize_limit, required_text, ApiError, ApiResponse, AppState,
};
use super::{parse_rarity, validate_image_url};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateCardRequest {
    pub name: String,
    pub rarity: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

// Option<Option<T>> is intentional: outer None = "not in request" (keep current),
// Some(None) = "explicitly cleared", Some(Some(v)) = "set to value" (PATCH semantics).
#[allow(clippy::option_option)]
#[derive(Debug, Deserialize)]
pub(in crate::api) struct UpdateCardRequest {
    pub name: Option<String>,
    pub rarity: Option<String>,
    #[serde(default, deserialize_with = "crate::api::deserialize_some")]
    pub image_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::api::deserialize_some")]
    pub description: Option<Option<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CardListQuery {
    pub rarity: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub limit: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(in crate::api) struct CardItem {
    id: i64,
    name: String,
    rarity: String,
    image_url: Option<String>,
    description: Option<String>,
    is_active: bool,
    updated_at: DateTime<Utc>,
}

impl From<gacha_db::CardRow> for CardItem {
    fn from(row: gacha_db::CardRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            rarity: row.rarity,
            image_url: row.image_url,
            description: row.description,
            is_active: row.is_active,
            updated_at: row.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(in crate::api) async fn list_cards(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiQuery(query): ApiQuery<CardListQuery>,
) -> Result<Json<ApiResponse<Vec<CardItem>>>, ApiError> {
    let rid = &req_id.0;
    let rarity = query
        .rarity
        .as_deref()
        .map(|r| parse_rarity(rid, r))
        .transpose()?;

    let rows = gacha_db::list_cards(
        &state.pool,
        gacha_db::CardFilters {
            rarity,
            include_inactive: query.include_inactive,
            limit: Some(normalize_limit(query.limit)),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let data = rows.into_iter().map(CardItem::from).collect();
    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// GET /api/v1/admin/cards/:id: one card, including deactivated ones.
pub(in crate::api) async fn get_card(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(card_id): ApiPath<i64>,
) -> Result<Json<ApiResponse<CardItem>>, ApiError> {
    let rid = &req_id.0;
    let row = gacha_db::get_card(&state.pool, card_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| ApiError::new(rid, "not_found", format!("card {card_id} not found")))?;

    Ok(Json(ApiResponse::new(CardItem::from(row), req_id.0)))
}

/// POST /api/v1/admin/cards: add a card to the catalog.
pub(in crate::api) async fn create_card(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<CreateCardRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CardItem>>), ApiError> {
    let rid = &req_id.0;
    let name = required_text(rid, "name", &body.name, 200)?;
    let rarity = parse_rarity(rid, &body.rarity)?;
    if let Some(ref url) = body.image_url {
        validate_image_url(rid, url)?;
    }

    let row = gacha_db::create_card(
        &state.pool,
        &gacha_db::NewCard {
            name: &name,
            rarity,
            image_url: body.image_url.as_deref(),
            description: body.description.as_deref(),
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(CardItem::from(row), req_id.0)),
    ))
}

/// PATCH /api/v1/admin/cards/:id: update card metadata (sparse).
pub(in crate::api) async fn update_card(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(card_id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateCardRequest>,
) -> Result<Json<ApiResponse<CardItem>>, ApiError> {
    let rid = &req_id.0;

    let name = body
        .name
        .as_deref()
        .map(|n| required_text(rid, "name", n, 200))
        .transpose()?;
    let rarity = body
        .rarity
        .as_deref()
        .map(|r| parse_rarity(rid, r))
        .transpose()?;
    if let Some(Some(ref url)) = body.image_url {
        validate_image_url(rid, url)?;
    }

    let row = gacha_db::update_card(
        &state.pool,
        card_id,
        &gacha_db::CardPatch {
            name: name.as_deref(),
            rarity,
            image_url: body.image_url.as_ref().map(|opt| opt.as_deref()),
            description: body.description.as_ref().map(|opt| opt.as_deref()),
            is_active: body.is_active,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(CardItem::from(row), req_id.0)))
}

/// DELETE /api/v1/admin/cards/:id: soft-delete a card.
pub(in crate::api) async fn deactivate_card(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(card_id): ApiPath<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    gacha_db::deactivate_card(&state.pool, card_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        serde_json::json!({ "deactivated": true }),
        req_id.0,
    )))
}

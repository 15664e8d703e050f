use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::extract::{ApiJson, ApiPath};
use crate::middleware::RequestId;

use super::super::{
    map_db_error, required_text, validation_error, ApiError, ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub(in crate::api) struct CreateProductRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub cost_per_draw: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct PoolCardRequest {
    pub card_id: i64,
    #[serde(default)]
    pub is_pickup: bool,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct CreateProductResponse {
    pub id: i64,
    pub slug: String,
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct AdminPoolCard {
    card_id: i64,
    name: String,
    rarity: String,
    is_pickup: bool,
}

/// Admin view of a product. Unlike the storefront detail this ignores the
/// active flag and the sale window.
#[derive(Debug, Serialize)]
pub(in crate::api) struct AdminProductDetail {
    id: i64,
    slug: String,
    name: String,
    description: Option<String>,
    cost_per_draw: i64,
    is_active: bool,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    pool: Vec<AdminPoolCard>,
}

/// POST /api/v1/admin/products: create a gacha product with an empty pool.
pub(in crate::api) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateProductResponse>>), ApiError> {
    let rid = &req_id.0;
    let name = required_text(rid, "name", &body.name, 200)?;
    if body.cost_per_draw <= 0 {
        return Err(validation_error(rid, "cost_per_draw must be positive"));
    }
    if let (Some(start), Some(end)) = (body.starts_at, body.ends_at) {
        if end <= start {
            return Err(validation_error(rid, "ends_at must be after starts_at"));
        }
    }
    let slug = match body.slug.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => gacha_core::slugify(s),
        _ => gacha_core::slugify(&name),
    };
    if slug.is_empty() {
        return Err(validation_error(rid, "name must contain at least one letter or digit"));
    }

    let row = gacha_db::create_product(
        &state.pool,
        &gacha_db::NewProduct {
            slug: &slug,
            name: &name,
            description: body.description.as_deref(),
            cost_per_draw: body.cost_per_draw,
            starts_at: body.starts_at,
            ends_at: body.ends_at,
        },
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            CreateProductResponse {
                id: row.id,
                slug: row.slug,
            },
            req_id.0,
        )),
    ))
}

/// GET /api/v1/admin/products/:id: any product, open or not, with its pool.
pub(in crate::api) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(product_id): ApiPath<i64>,
) -> Result<Json<ApiResponse<AdminProductDetail>>, ApiError> {
    let rid = &req_id.0;
    let product = gacha_db::get_product(&state.pool, product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(rid, "not_found", format!("product {product_id} not found"))
        })?;
    let pool = gacha_db::list_pool_cards(&state.pool, product.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let data = AdminProductDetail {
        id: product.id,
        slug: product.slug,
        name: product.name,
        description: product.description,
        cost_per_draw: product.cost_per_draw,
        is_active: product.is_active,
        starts_at: product.starts_at,
        ends_at: product.ends_at,
        updated_at: product.updated_at,
        pool: pool
            .into_iter()
            .map(|c| AdminPoolCard {
                card_id: c.card_id,
                name: c.name,
                rarity: c.rarity,
                is_pickup: c.is_pickup,
            })
            .collect(),
    };

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// PUT /api/v1/admin/products/:id/pool: add a card to the pool or update
/// its pickup flag.
pub(in crate::api) async fn upsert_pool_card(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(product_id): ApiPath<i64>,
    ApiJson(body): ApiJson<PoolCardRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    gacha_db::upsert_pool_card(&state.pool, product_id, body.card_id, body.is_pickup)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        serde_json::json!({
            "product_id": product_id,
            "card_id": body.card_id,
            "is_pickup": body.is_pickup,
        }),
        req_id.0,
    )))
}

pub(in crate::api) async fn remove_pool_card(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath((product_id, card_id)): ApiPath<(i64, i64)>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    gacha_db::remove_pool_card(&state.pool, product_id, card_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(
        serde_json::json!({ "removed": true }),
        req_id.0,
    )))
}

//! Storefront and draw handlers.
//!
//! - `GET  /api/v1/gacha/products`      : open products with pool composition
//! - `GET  /api/v1/gacha/products/:id`  : one product, its pool and rate table
//! - `POST /api/v1/gacha/execute`       : draw 1 or 10 cards (user auth)

use axum::{
    extract::State,
    http::HeaderMap,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use gacha_core::{DrawCount, Rarity, RarityTable, PICKUP_RATE};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::extract::{ApiJson, ApiPath};
use crate::middleware::{CurrentUser, RequestId};

use super::{map_db_error, ApiError, ApiResponse, AppState};

const IDEMPOTENCY_HEADER: &str = "idempotency-key";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    id: i64,
    slug: String,
    name: String,
    description: Option<String>,
    cost_per_draw: i64,
    cost_per_ten: i64,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    pool_size: i64,
    rarity_counts: RarityCounts,
    pickup_count: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct RarityCounts {
    #[serde(rename = "N")]
    n: i64,
    #[serde(rename = "R")]
    r: i64,
    #[serde(rename = "SR")]
    sr: i64,
    #[serde(rename = "SSR")]
    ssr: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct RateItem {
    rarity: Rarity,
    percent: f64,
}

#[derive(Debug, Serialize)]
pub(super) struct PoolCardItem {
    card_id: i64,
    name: String,
    rarity: String,
    image_url: Option<String>,
    is_pickup: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct ProductDetail {
    id: i64,
    slug: String,
    name: String,
    description: Option<String>,
    cost_per_draw: i64,
    is_active: bool,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    rates: Vec<RateItem>,
    guaranteed_rates: Vec<RateItem>,
    pickup_rate: f64,
    pool: Vec<PoolCardItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct DrawnCardItem {
    index: usize,
    card_id: i64,
    name: String,
    rarity: String,
    image_url: Option<String>,
    is_pickup: bool,
    was_guaranteed: bool,
    is_new: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct DrawResult {
    batch_id: Uuid,
    product_id: i64,
    cost: i64,
    free_points: i64,
    paid_points: i64,
    level: i32,
    cards: Vec<DrawnCardItem>,
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct ExecuteRequest {
    pub product_id: i64,
    pub count: u32,
}

fn rate_items(table: &RarityTable) -> Vec<RateItem> {
    table
        .entries()
        .into_iter()
        .map(|(rarity, percent)| RateItem { rarity, percent })
        .collect()
}

fn idempotency_key<'h>(headers: &'h HeaderMap, req_id: &str) -> Result<Option<&'h str>, ApiError> {
    let Some(value) = headers.get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let key = value
        .to_str()
        .map(str::trim)
        .map_err(|_| ApiError::new(req_id, "bad_request", "Idempotency-Key must be ASCII"))?;
    if key.is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ApiError::new(
            req_id,
            "bad_request",
            format!("Idempotency-Key must be 1-{MAX_IDEMPOTENCY_KEY_LEN} characters"),
        ));
    }
    Ok(Some(key))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let rows = gacha_db::list_active_products(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows
        .into_iter()
        .map(|row| ProductItem {
            id: row.id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            cost_per_draw: row.cost_per_draw,
            cost_per_ten: row.cost_per_draw.saturating_mul(10),
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            pool_size: row.pool_size,
            rarity_counts: RarityCounts {
                n: row.n_count,
                r: row.r_count,
                sr: row.sr_count,
                ssr: row.ssr_count,
            },
            pickup_count: row.pickup_count,
        })
        .collect();

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(product_id): ApiPath<i64>,
) -> Result<Json<ApiResponse<ProductDetail>>, ApiError> {
    let rid = &req_id.0;
    let product = gacha_db::get_open_product(&state.pool, product_id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?
        .ok_or_else(|| {
            ApiError::new(rid, "not_found", format!("product {product_id} not found"))
        })?;

    let pool = gacha_db::list_pool_cards(&state.pool, product.id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let table = &state.config.rarity_table;
    let data = ProductDetail {
        id: product.id,
        slug: product.slug,
        name: product.name,
        description: product.description,
        cost_per_draw: product.cost_per_draw,
        is_active: product.is_active,
        starts_at: product.starts_at,
        ends_at: product.ends_at,
        rates: rate_items(table),
        guaranteed_rates: rate_items(&RarityTable::guaranteed()),
        pickup_rate: PICKUP_RATE,
        pool: pool
            .into_iter()
            .map(|c| PoolCardItem {
                card_id: c.card_id,
                name: c.name,
                rarity: c.rarity,
                image_url: c.image_url,
                is_pickup: c.is_pickup,
            })
            .collect(),
    };

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

/// POST /api/v1/gacha/execute: debit points and draw `count` cards.
pub(super) async fn execute_gacha(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<ExecuteRequest>,
) -> Result<Json<ApiResponse<DrawResult>>, ApiError> {
    let rid = &req_id.0;
    let count = DrawCount::try_from(body.count).map_err(|e| {
        ApiError::new(rid, "validation_error", e.to_string())
    })?;
    let key = idempotency_key(&headers, rid)?;

    let mut rng = StdRng::from_os_rng();
    let outcome = gacha_db::execute_draw(
        &state.pool,
        gacha_db::DrawRequest {
            user_id: user.id,
            product_id: body.product_id,
            count,
            idempotency_key: key,
        },
        &state.config.rarity_table,
        &mut rng,
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    let data = DrawResult {
        batch_id: outcome.batch_id,
        product_id: outcome.product_id,
        cost: outcome.cost,
        free_points: outcome.balance.free,
        paid_points: outcome.balance.paid,
        level: outcome.level,
        cards: outcome
            .cards
            .into_iter()
            .map(|c| DrawnCardItem {
                index: c.index,
                card_id: c.card_id,
                name: c.name,
                rarity: c.rarity,
                image_url: c.image_url,
                is_pickup: c.is_pickup,
                was_guaranteed: c.was_guaranteed,
                is_new: c.is_new,
            })
            .collect(),
    };

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

//! Database operations for `gacha_products` and `gacha_pools`.

use chrono::{DateTime, Utc};
use gacha_core::{DrawPool, PoolCard, Rarity};
use sqlx::{PgExecutor, PgPool};

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_per_draw: i64,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Storefront listing row: a product plus its pool composition.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductSummaryRow {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub cost_per_draw: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub pool_size: i64,
    pub n_count: i64,
    pub r_count: i64,
    pub sr_count: i64,
    pub ssr_count: i64,
    pub pickup_count: i64,
}

/// A card in a product's pool, joined with catalog fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PoolCardRow {
    pub card_id: i64,
    pub name: String,
    pub rarity: String,
    pub image_url: Option<String>,
    pub is_pickup: bool,
}

#[derive(Debug, Clone)]
pub struct NewProduct<'a> {
    pub slug: &'a str,
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub cost_per_draw: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

const PRODUCT_COLUMNS: &str = "id, slug, name, description, cost_per_draw, is_active, \
     starts_at, ends_at, created_at, updated_at";

/// SQL predicate for a product that can be drawn from right now.
pub(crate) const PRODUCT_OPEN_PREDICATE: &str = "p.is_active \
     AND (p.starts_at IS NULL OR p.starts_at <= NOW()) \
     AND (p.ends_at IS NULL OR p.ends_at > NOW())";

// ---------------------------------------------------------------------------
// gacha_products operations
// ---------------------------------------------------------------------------

/// Lists products that are active and inside their sale window, with pool
/// counts per rarity. Products with an empty pool are omitted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_products(pool: &PgPool) -> Result<Vec<ProductSummaryRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductSummaryRow>(&format!(
        "SELECT p.id, p.slug, p.name, p.description, p.cost_per_draw, p.starts_at, p.ends_at, \
                COUNT(c.id)                                   AS pool_size, \
                COUNT(c.id) FILTER (WHERE c.rarity = 'N')     AS n_count, \
                COUNT(c.id) FILTER (WHERE c.rarity = 'R')     AS r_count, \
                COUNT(c.id) FILTER (WHERE c.rarity = 'SR')    AS sr_count, \
                COUNT(c.id) FILTER (WHERE c.rarity = 'SSR')   AS ssr_count, \
                COUNT(c.id) FILTER (WHERE gp.is_pickup)       AS pickup_count \
         FROM gacha_products p \
         JOIN gacha_pools gp ON gp.product_id = p.id \
         JOIN cards c ON c.id = gp.card_id AND c.is_active \
         WHERE {PRODUCT_OPEN_PREDICATE} \
         GROUP BY p.id \
         ORDER BY p.created_at DESC, p.id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product<'e, E>(executor: E, product_id: i64) -> Result<Option<ProductRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM gacha_products WHERE id = $1"
    ))
    .bind(product_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_slug(pool: &PgPool, slug: &str) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM gacha_products WHERE slug = $1"
    ))
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Fetches a product only if it is currently open for draws: active and
/// inside its `starts_at`/`ends_at` window.
pub async fn get_open_product<'e, E>(
    executor: E,
    product_id: i64,
) -> Result<Option<ProductRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM gacha_products p \
         WHERE p.id = $1 AND {PRODUCT_OPEN_PREDICATE}"
    ))
    .bind(product_id)
    .fetch_optional(executor)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (e.g. duplicate slug).
pub async fn create_product(pool: &PgPool, product: &NewProduct<'_>) -> Result<ProductRow, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "INSERT INTO gacha_products (slug, name, description, cost_per_draw, starts_at, ends_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(product.slug)
    .bind(product.name)
    .bind(product.description)
    .bind(product.cost_per_draw)
    .bind(product.starts_at)
    .bind(product.ends_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// gacha_pools operations
// ---------------------------------------------------------------------------

/// Lists the active cards in a product's pool, rarest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pool_cards<'e, E>(executor: E, product_id: i64) -> Result<Vec<PoolCardRow>, DbError>
where
    E: PgExecutor<'e>,
{
    let rows = sqlx::query_as::<_, PoolCardRow>(
        "SELECT c.id AS card_id, c.name, c.rarity, c.image_url, gp.is_pickup \
         FROM gacha_pools gp \
         JOIN cards c ON c.id = gp.card_id \
         WHERE gp.product_id = $1 AND c.is_active \
         ORDER BY CASE c.rarity WHEN 'SSR' THEN 0 WHEN 'SR' THEN 1 WHEN 'R' THEN 2 ELSE 3 END, \
                  gp.is_pickup DESC, c.name",
    )
    .bind(product_id)
    .fetch_all(executor)
    .await?;

    Ok(rows)
}

/// Converts pool rows into the engine's [`DrawPool`].
///
/// # Errors
///
/// Returns [`DbError::Core`] if a row carries an unknown rarity code.
pub fn load_draw_pool(rows: &[PoolCardRow]) -> Result<DrawPool, DbError> {
    let cards = rows
        .iter()
        .map(|row| {
            Ok(PoolCard {
                card_id: row.card_id,
                rarity: row.rarity.parse::<Rarity>()?,
                is_pickup: row.is_pickup,
            })
        })
        .collect::<Result<Vec<_>, gacha_core::CoreError>>()?;

    Ok(DrawPool::new(cards))
}

/// Adds a card to a product's pool, or updates its pickup flag if present.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails (e.g. unknown product/card).
pub async fn upsert_pool_card(
    pool: &PgPool,
    product_id: i64,
    card_id: i64,
    is_pickup: bool,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO gacha_pools (product_id, card_id, is_pickup) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (product_id, card_id) DO UPDATE SET is_pickup = EXCLUDED.is_pickup",
    )
    .bind(product_id)
    .bind(card_id)
    .bind(is_pickup)
    .execute(pool)
    .await?;

    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the card was not in the pool.
pub async fn remove_pool_card(pool: &PgPool, product_id: i64, card_id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM gacha_pools WHERE product_id = $1 AND card_id = $2")
        .bind(product_id)
        .bind(card_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(card_id: i64, rarity: &str, is_pickup: bool) -> PoolCardRow {
        PoolCardRow {
            card_id,
            name: format!("Card {card_id}"),
            rarity: rarity.to_string(),
            image_url: None,
            is_pickup,
        }
    }

    #[test]
    fn load_draw_pool_groups_rows() {
        let pool = load_draw_pool(&[row(1, "N", false), row(2, "SSR", true), row(3, "SSR", false)])
            .unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.cards_of(Rarity::SSR).len(), 2);
        assert!(pool.has_sr_or_above());
    }

    #[test]
    fn load_draw_pool_rejects_unknown_rarity() {
        let err = load_draw_pool(&[row(1, "UR", false)]).unwrap_err();
        assert!(matches!(err, DbError::Core(_)));
    }
}

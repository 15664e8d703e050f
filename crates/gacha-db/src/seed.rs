use std::collections::HashMap;

use gacha_core::CatalogFile;
use sqlx::PgPool;

use crate::DbError;

/// Counts of rows touched by [`seed_catalog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub cards: usize,
    pub products: usize,
    pub pool_entries: usize,
}

/// Upsert cards, products and pool membership from a parsed catalog.
///
/// Cards are keyed by name and products by slug, so re-running the seed is
/// idempotent. Each product's pool is replaced by the catalog's list. All
/// upserts run inside a single transaction; if any operation fails the
/// entire batch is rolled back.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if a pool entry names a card missing from
/// the catalog, or [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_catalog(pool: &PgPool, catalog: &CatalogFile) -> Result<SeedSummary, DbError> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary::default();
    let mut card_ids: HashMap<&str, i64> = HashMap::with_capacity(catalog.cards.len());

    for card in &catalog.cards {
        let card_id: i64 = sqlx::query_scalar(
            "INSERT INTO cards (name, rarity, image_url, description, is_active) \
             VALUES ($1, $2, $3, $4, true) \
             ON CONFLICT (name) DO UPDATE SET \
                 rarity = EXCLUDED.rarity, \
                 image_url = EXCLUDED.image_url, \
                 description = EXCLUDED.description, \
                 is_active = true, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(&card.name)
        .bind(card.rarity.as_str())
        .bind(&card.image_url)
        .bind(&card.description)
        .fetch_one(&mut *tx)
        .await?;

        card_ids.insert(card.name.as_str(), card_id);
        summary.cards += 1;
    }

    for product in &catalog.products {
        let slug = product.slug();
        let product_id: i64 = sqlx::query_scalar(
            "INSERT INTO gacha_products (slug, name, description, cost_per_draw, is_active) \
             VALUES ($1, $2, $3, $4, true) \
             ON CONFLICT (slug) DO UPDATE SET \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 cost_per_draw = EXCLUDED.cost_per_draw, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(&slug)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.cost_per_draw)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM gacha_pools WHERE product_id = $1")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        for entry in &product.pool {
            let card_id = *card_ids.get(entry.card.as_str()).ok_or(DbError::NotFound)?;
            sqlx::query(
                "INSERT INTO gacha_pools (product_id, card_id, is_pickup) VALUES ($1, $2, $3)",
            )
            .bind(product_id)
            .bind(card_id)
            .bind(entry.pickup)
            .execute(&mut *tx)
            .await?;
            summary.pool_entries += 1;
        }

        summary.products += 1;
    }

    tx.commit().await?;

    tracing::info!(
        cards = summary.cards,
        products = summary.products,
        pool_entries = summary.pool_entries,
        "catalog seeded"
    );
    Ok(summary)
}

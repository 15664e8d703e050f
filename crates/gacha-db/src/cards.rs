//! Database operations for the `cards` catalog.

use chrono::{DateTime, Utc};
use gacha_core::Rarity;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CardRow {
    pub id: i64,
    pub name: String,
    pub rarity: String,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCard<'a> {
    pub name: &'a str,
    pub rarity: Rarity,
    pub image_url: Option<&'a str>,
    pub description: Option<&'a str>,
}

/// Partial update. For nullable columns, `None` keeps the current value,
/// `Some(None)` clears it and `Some(Some(v))` sets it.
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Default)]
pub struct CardPatch<'a> {
    pub name: Option<&'a str>,
    pub rarity: Option<Rarity>,
    pub image_url: Option<Option<&'a str>>,
    pub description: Option<Option<&'a str>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CardFilters {
    pub rarity: Option<Rarity>,
    pub include_inactive: bool,
    pub limit: Option<i64>,
}

const CARD_COLUMNS: &str =
    "id, name, rarity, image_url, description, is_active, created_at, updated_at";

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (e.g. duplicate name).
pub async fn create_card(pool: &PgPool, card: &NewCard<'_>) -> Result<CardRow, DbError> {
    let row = sqlx::query_as::<_, CardRow>(&format!(
        "INSERT INTO cards (name, rarity, image_url, description) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {CARD_COLUMNS}"
    ))
    .bind(card.name)
    .bind(card.rarity.as_str())
    .bind(card.image_url)
    .bind(card.description)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_card(pool: &PgPool, card_id: i64) -> Result<Option<CardRow>, DbError> {
    let row = sqlx::query_as::<_, CardRow>(&format!(
        "SELECT {CARD_COLUMNS} FROM cards WHERE id = $1"
    ))
    .bind(card_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Lists cards, rarest first then by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_cards(pool: &PgPool, filters: CardFilters) -> Result<Vec<CardRow>, DbError> {
    let rows = sqlx::query_as::<_, CardRow>(&format!(
        "SELECT {CARD_COLUMNS} FROM cards \
         WHERE ($1::TEXT IS NULL OR rarity = $1) \
           AND ($2::BOOL OR is_active) \
         ORDER BY CASE rarity WHEN 'SSR' THEN 0 WHEN 'SR' THEN 1 WHEN 'R' THEN 2 ELSE 3 END, name \
         LIMIT COALESCE($3, 9223372036854775807)"
    ))
    .bind(filters.rarity.map(Rarity::as_str))
    .bind(filters.include_inactive)
    .bind(filters.limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Overlays `patch` onto an existing card in a single `UPDATE ... RETURNING`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the card does not exist, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn update_card(
    pool: &PgPool,
    card_id: i64,
    patch: &CardPatch<'_>,
) -> Result<CardRow, DbError> {
    let image_url_supplied = patch.image_url.is_some();
    let image_url_val = patch.image_url.flatten();
    let description_supplied = patch.description.is_some();
    let description_val = patch.description.flatten();

    sqlx::query_as::<_, CardRow>(&format!(
        "UPDATE cards \
         SET name        = COALESCE($2, name), \
             rarity      = COALESCE($3, rarity), \
             image_url   = CASE WHEN $4::BOOL THEN $5 ELSE image_url END, \
             description = CASE WHEN $6::BOOL THEN $7 ELSE description END, \
             is_active   = COALESCE($8, is_active), \
             updated_at  = NOW() \
         WHERE id = $1 \
         RETURNING {CARD_COLUMNS}"
    ))
    .bind(card_id)
    .bind(patch.name)
    .bind(patch.rarity.map(Rarity::as_str))
    .bind(image_url_supplied)
    .bind(image_url_val)
    .bind(description_supplied)
    .bind(description_val)
    .bind(patch.is_active)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Soft-deletes a card. Inactive cards drop out of every draw pool but stay
/// in users' collections.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the card does not exist.
pub async fn deactivate_card(pool: &PgPool, card_id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE cards SET is_active = false, updated_at = NOW() WHERE id = $1",
    )
    .bind(card_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

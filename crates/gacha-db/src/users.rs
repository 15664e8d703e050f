//! Database operations for `users`, `user_cards` and `transactions`.

use chrono::{DateTime, Utc};
use gacha_core::PointBalance;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `users` table. `token_hash` is deliberately not selected.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub display_name: String,
    pub free_points: i64,
    pub paid_points: i64,
    pub level: i32,
    pub total_draws: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    #[must_use]
    pub fn balance(&self) -> PointBalance {
        PointBalance::new(self.free_points, self.paid_points)
    }
}

/// An owned card joined with its catalog entry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCardRow {
    pub card_id: i64,
    pub name: String,
    pub rarity: String,
    pub image_url: Option<String>,
    pub quantity: i32,
    pub first_obtained_at: DateTime<Utc>,
}

/// A row from the `transactions` point ledger.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub free_delta: i64,
    pub paid_delta: i64,
    pub balance_after: i64,
    pub draw_batch_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const USER_COLUMNS: &str = "id, display_name, free_points, paid_points, level, \
     total_draws, is_active, created_at, updated_at";

// ---------------------------------------------------------------------------
// users operations
// ---------------------------------------------------------------------------

/// Creates a user with an already-hashed bearer token.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a token-hash collision).
pub async fn create_user(
    pool: &PgPool,
    display_name: &str,
    token_hash: &str,
    initial: PointBalance,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (display_name, token_hash, free_points, paid_points) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(display_name)
    .bind(token_hash)
    .bind(initial.free)
    .bind(initial.paid)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no user has that id.
pub async fn get_user(pool: &PgPool, user_id: i64) -> Result<UserRow, DbError> {
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(DbError::NotFound)
}

/// Resolves an active user from the salted hash of their bearer token.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_user_by_token_hash(
    pool: &PgPool,
    token_hash: &str,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE token_hash = $1 AND is_active"
    ))
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Adds points to a user and records a `grant` ledger entry, atomically.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] for an unknown user, [`DbError::Core`] for
/// negative or overflowing amounts, or [`DbError::Sqlx`] on query failure.
pub async fn grant_points(
    pool: &PgPool,
    user_id: i64,
    free: i64,
    paid: i64,
    note: Option<&str>,
) -> Result<UserRow, DbError> {
    let mut tx = pool.begin().await?;

    let current: Option<(i64, i64)> =
        sqlx::query_as("SELECT free_points, paid_points FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
    let (current_free, current_paid) = current.ok_or(DbError::NotFound)?;

    let updated = PointBalance::new(current_free, current_paid).grant(free, paid)?;

    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users SET free_points = $2, paid_points = $3, updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user_id)
    .bind(updated.free)
    .bind(updated.paid)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO transactions (user_id, kind, free_delta, paid_delta, balance_after, note) \
         VALUES ($1, 'grant', $2, $3, $4, $5)",
    )
    .bind(user_id)
    .bind(free)
    .bind(paid)
    .bind(updated.total())
    .bind(note)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

// ---------------------------------------------------------------------------
// user_cards / transactions reads
// ---------------------------------------------------------------------------

/// Lists cards the user currently holds (`quantity > 0`), rarest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_user_cards(pool: &PgPool, user_id: i64) -> Result<Vec<UserCardRow>, DbError> {
    let rows = sqlx::query_as::<_, UserCardRow>(
        "SELECT uc.card_id, c.name, c.rarity, c.image_url, uc.quantity, uc.first_obtained_at \
         FROM user_cards uc \
         JOIN cards c ON c.id = uc.card_id \
         WHERE uc.user_id = $1 AND uc.quantity > 0 \
         ORDER BY CASE c.rarity WHEN 'SSR' THEN 0 WHEN 'SR' THEN 1 WHEN 'R' THEN 2 ELSE 3 END, \
                  c.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Newest-first slice of the user's point ledger.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_transactions(
    pool: &PgPool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<TransactionRow>, DbError> {
    let rows = sqlx::query_as::<_, TransactionRow>(
        "SELECT id, user_id, kind, free_delta, paid_delta, balance_after, draw_batch_id, note, \
                created_at \
         FROM transactions \
         WHERE user_id = $1 \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

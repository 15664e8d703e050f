//! Database operations for site announcements.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnnouncementRow {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AnnouncementPatch<'a> {
    pub title: Option<&'a str>,
    pub body: Option<&'a str>,
    pub is_published: Option<bool>,
}

const ANNOUNCEMENT_COLUMNS: &str =
    "id, title, body, is_published, published_at, created_at, updated_at";

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_announcement(
    pool: &PgPool,
    title: &str,
    body: &str,
    is_published: bool,
) -> Result<AnnouncementRow, DbError> {
    let row = sqlx::query_as::<_, AnnouncementRow>(&format!(
        "INSERT INTO announcements (title, body, is_published, published_at) \
         VALUES ($1, $2, $3, CASE WHEN $3 THEN NOW() END) \
         RETURNING {ANNOUNCEMENT_COLUMNS}"
    ))
    .bind(title)
    .bind(body)
    .bind(is_published)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Admin listing: every announcement, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_announcements(pool: &PgPool) -> Result<Vec<AnnouncementRow>, DbError> {
    let rows = sqlx::query_as::<_, AnnouncementRow>(&format!(
        "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Public listing: published announcements, most recently published first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_published_announcements(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<AnnouncementRow>, DbError> {
    let rows = sqlx::query_as::<_, AnnouncementRow>(&format!(
        "SELECT {ANNOUNCEMENT_COLUMNS} FROM announcements \
         WHERE is_published \
         ORDER BY published_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Applies a partial update. `published_at` is stamped on the first publish
/// and kept across later edits; unpublishing leaves it in place.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the announcement does not exist.
pub async fn update_announcement(
    pool: &PgPool,
    announcement_id: i64,
    patch: &AnnouncementPatch<'_>,
) -> Result<AnnouncementRow, DbError> {
    sqlx::query_as::<_, AnnouncementRow>(&format!(
        "UPDATE announcements \
         SET title        = COALESCE($2, title), \
             body         = COALESCE($3, body), \
             is_published = COALESCE($4, is_published), \
             published_at = CASE \
                 WHEN COALESCE($4, is_published) AND published_at IS NULL THEN NOW() \
                 ELSE published_at END, \
             updated_at   = NOW() \
         WHERE id = $1 \
         RETURNING {ANNOUNCEMENT_COLUMNS}"
    ))
    .bind(announcement_id)
    .bind(patch.title)
    .bind(patch.body)
    .bind(patch.is_published)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the announcement does not exist.
pub async fn delete_announcement(pool: &PgPool, announcement_id: i64) -> Result<(), DbError> {
    let result = sqlx::query("DELETE FROM announcements WHERE id = $1")
        .bind(announcement_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

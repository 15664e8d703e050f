//! Database operations for `push_notifications`.
//!
//! A notification is editable while it is `draft` or `scheduled`. The
//! scheduler flips due `scheduled` rows to `sent`.

use chrono::{DateTime, Utc};
use gacha_core::NotificationStatus;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub title: String,
    pub body: String,
    pub target_url: Option<String>,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub target_url: Option<&'a str>,
    /// `None` creates a draft; `Some` schedules it.
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Partial update. `scheduled_at: Some(None)` moves a scheduled notification
/// back to draft.
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Default)]
pub struct NotificationPatch<'a> {
    pub title: Option<&'a str>,
    pub body: Option<&'a str>,
    pub target_url: Option<Option<&'a str>>,
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
}

const NOTIFICATION_COLUMNS: &str = "id, title, body, target_url, status, scheduled_at, sent_at, \
     created_at, updated_at";

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_notification(
    pool: &PgPool,
    notification: &NewNotification<'_>,
) -> Result<NotificationRow, DbError> {
    let status = if notification.scheduled_at.is_some() {
        NotificationStatus::Scheduled
    } else {
        NotificationStatus::Draft
    };

    let row = sqlx::query_as::<_, NotificationRow>(&format!(
        "INSERT INTO push_notifications (title, body, target_url, status, scheduled_at) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {NOTIFICATION_COLUMNS}"
    ))
    .bind(notification.title)
    .bind(notification.body)
    .bind(notification.target_url)
    .bind(status.as_str())
    .bind(notification.scheduled_at)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Admin listing, newest first, optionally filtered by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_notifications(
    pool: &PgPool,
    status: Option<NotificationStatus>,
) -> Result<Vec<NotificationRow>, DbError> {
    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM push_notifications \
         WHERE ($1::TEXT IS NULL OR status = $1) \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(status.map(NotificationStatus::as_str))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// User-facing inbox: notifications already delivered, most recent first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sent_notifications(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<NotificationRow>, DbError> {
    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM push_notifications \
         WHERE status = 'sent' \
         ORDER BY sent_at DESC, id DESC \
         LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Locks the row and returns its status, rejecting non-editable ones.
async fn lock_editable(
    tx: &mut sqlx::PgConnection,
    notification_id: i64,
) -> Result<NotificationStatus, DbError> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT status FROM push_notifications WHERE id = $1 FOR UPDATE")
            .bind(notification_id)
            .fetch_optional(&mut *tx)
            .await?;
    let status = status.ok_or(DbError::NotFound)?;
    let parsed: NotificationStatus = status.parse()?;
    if !parsed.is_editable() {
        return Err(DbError::NotEditable {
            entity: "notification",
            id: notification_id,
            status,
        });
    }
    Ok(parsed)
}

/// Applies a partial update. Setting `scheduled_at` moves the row to
/// `scheduled`; clearing it moves the row back to `draft`.
///
/// # Errors
///
/// - [`DbError::NotFound`] if the notification does not exist
/// - [`DbError::NotEditable`] if it was already sent or cancelled
/// - [`DbError::Sqlx`] on query failure
pub async fn update_notification(
    pool: &PgPool,
    notification_id: i64,
    patch: &NotificationPatch<'_>,
) -> Result<NotificationRow, DbError> {
    let mut tx = pool.begin().await?;
    lock_editable(&mut tx, notification_id).await?;

    let target_url_supplied = patch.target_url.is_some();
    let target_url_val = patch.target_url.flatten();
    let scheduled_supplied = patch.scheduled_at.is_some();
    let scheduled_val = patch.scheduled_at.flatten();
    let next_status = scheduled_supplied.then(|| {
        if scheduled_val.is_some() {
            NotificationStatus::Scheduled.as_str()
        } else {
            NotificationStatus::Draft.as_str()
        }
    });

    let row = sqlx::query_as::<_, NotificationRow>(&format!(
        "UPDATE push_notifications \
         SET title        = COALESCE($2, title), \
             body         = COALESCE($3, body), \
             target_url   = CASE WHEN $4::BOOL THEN $5 ELSE target_url END, \
             scheduled_at = CASE WHEN $6::BOOL THEN $7 ELSE scheduled_at END, \
             status       = COALESCE($8, status), \
             updated_at   = NOW() \
         WHERE id = $1 \
         RETURNING {NOTIFICATION_COLUMNS}"
    ))
    .bind(notification_id)
    .bind(patch.title)
    .bind(patch.body)
    .bind(target_url_supplied)
    .bind(target_url_val)
    .bind(scheduled_supplied)
    .bind(scheduled_val)
    .bind(next_status)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

/// # Errors
///
/// - [`DbError::NotFound`] if the notification does not exist
/// - [`DbError::NotEditable`] if it was already sent or cancelled
pub async fn cancel_notification(
    pool: &PgPool,
    notification_id: i64,
) -> Result<NotificationRow, DbError> {
    let mut tx = pool.begin().await?;
    lock_editable(&mut tx, notification_id).await?;

    let row = sqlx::query_as::<_, NotificationRow>(&format!(
        "UPDATE push_notifications SET status = 'cancelled', updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {NOTIFICATION_COLUMNS}"
    ))
    .bind(notification_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

/// Marks every `scheduled` notification whose time has come as `sent` and
/// returns the rows that flipped.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_due_notifications_sent(
    pool: &PgPool,
    now: DateTime<Utc>,
) -> Result<Vec<NotificationRow>, DbError> {
    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
        "UPDATE push_notifications \
         SET status = 'sent', sent_at = $1, updated_at = NOW() \
         WHERE status = 'scheduled' AND scheduled_at <= $1 \
         RETURNING {NOTIFICATION_COLUMNS}"
    ))
    .bind(now)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

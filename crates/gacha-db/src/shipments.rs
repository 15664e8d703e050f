//! Physical shipment requests. Requesting a shipment moves card copies out of
//! the user's collection; cancelling puts them back.

use chrono::{DateTime, Utc};
use gacha_core::{normalize_lines, ShipmentLine, ShipmentStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShipmentRow {
    pub id: i64,
    pub public_id: Uuid,
    pub user_id: i64,
    pub status: String,
    pub recipient_name: String,
    pub postal_code: String,
    pub address: String,
    pub phone: Option<String>,
    pub tracking_number: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShipmentItemRow {
    pub shipment_id: i64,
    pub card_id: i64,
    pub name: String,
    pub rarity: String,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct NewShipment<'a> {
    pub user_id: i64,
    pub recipient_name: &'a str,
    pub postal_code: &'a str,
    pub address: &'a str,
    pub phone: Option<&'a str>,
    pub lines: Vec<ShipmentLine>,
}

const SHIPMENT_COLUMNS: &str = "id, public_id, user_id, status, recipient_name, postal_code, \
     address, phone, tracking_number, shipped_at, created_at, updated_at";

/// Creates a `pending` shipment and removes the requested copies from the
/// user's collection in one transaction.
///
/// # Errors
///
/// - [`DbError::Core`] if the lines are empty or a quantity is not positive,
///   or the address fields are blank
/// - [`DbError::InsufficientCards`] if the user holds fewer copies than requested
/// - [`DbError::Sqlx`] on query failure
pub async fn create_shipment(
    pool: &PgPool,
    shipment: &NewShipment<'_>,
) -> Result<ShipmentRow, DbError> {
    for (field, value) in [
        ("recipient_name", shipment.recipient_name),
        ("postal_code", shipment.postal_code),
        ("address", shipment.address),
    ] {
        if value.trim().is_empty() {
            return Err(gacha_core::CoreError::Validation(format!("{field} must not be blank")).into());
        }
    }
    let lines = normalize_lines(&shipment.lines)?;

    let mut tx = pool.begin().await?;

    for line in &lines {
        let result = sqlx::query(
            "UPDATE user_cards \
             SET quantity = quantity - $3, updated_at = NOW() \
             WHERE user_id = $1 AND card_id = $2 AND quantity >= $3",
        )
        .bind(shipment.user_id)
        .bind(line.card_id)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::InsufficientCards {
                card_id: line.card_id,
            });
        }
    }

    let row = sqlx::query_as::<_, ShipmentRow>(&format!(
        "INSERT INTO shipments (public_id, user_id, recipient_name, postal_code, address, phone) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {SHIPMENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(shipment.user_id)
    .bind(shipment.recipient_name.trim())
    .bind(shipment.postal_code.trim())
    .bind(shipment.address.trim())
    .bind(shipment.phone.map(str::trim).filter(|p| !p.is_empty()))
    .fetch_one(&mut *tx)
    .await?;

    for line in &lines {
        sqlx::query("INSERT INTO shipment_items (shipment_id, card_id, quantity) VALUES ($1, $2, $3)")
            .bind(row.id)
            .bind(line.card_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        shipment_id = row.id,
        user_id = shipment.user_id,
        lines = lines.len(),
        "shipment requested"
    );
    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_shipment(pool: &PgPool, shipment_id: i64) -> Result<Option<ShipmentRow>, DbError> {
    let row = sqlx::query_as::<_, ShipmentRow>(&format!(
        "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = $1"
    ))
    .bind(shipment_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Admin listing, newest first, optionally filtered by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_shipments(
    pool: &PgPool,
    status: Option<ShipmentStatus>,
    limit: i64,
) -> Result<Vec<ShipmentRow>, DbError> {
    let rows = sqlx::query_as::<_, ShipmentRow>(&format!(
        "SELECT {SHIPMENT_COLUMNS} FROM shipments \
         WHERE ($1::TEXT IS NULL OR status = $1) \
         ORDER BY created_at DESC, id DESC \
         LIMIT $2"
    ))
    .bind(status.map(ShipmentStatus::as_str))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_shipments_for_user(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<ShipmentRow>, DbError> {
    let rows = sqlx::query_as::<_, ShipmentRow>(&format!(
        "SELECT {SHIPMENT_COLUMNS} FROM shipments \
         WHERE user_id = $1 \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Items for a set of shipments, grouped by shipment id then card rarity.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_shipment_items(
    pool: &PgPool,
    shipment_ids: &[i64],
) -> Result<Vec<ShipmentItemRow>, DbError> {
    if shipment_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, ShipmentItemRow>(
        "SELECT si.shipment_id, si.card_id, c.name, c.rarity, si.quantity \
         FROM shipment_items si \
         JOIN cards c ON c.id = si.card_id \
         WHERE si.shipment_id = ANY($1) \
         ORDER BY si.shipment_id, \
                  CASE c.rarity WHEN 'SSR' THEN 0 WHEN 'SR' THEN 1 WHEN 'R' THEN 2 ELSE 3 END, \
                  c.name",
    )
    .bind(shipment_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Moves a shipment to `next`. Moving to `cancelled` returns every item to
/// the owner's collection; moving to `shipped` records the tracking number
/// and `shipped_at`.
///
/// # Errors
///
/// - [`DbError::NotFound`] if the shipment does not exist
/// - [`DbError::Core`] for a disallowed transition or a missing tracking number
/// - [`DbError::Sqlx`] on query failure
pub async fn update_shipment_status(
    pool: &PgPool,
    shipment_id: i64,
    next: ShipmentStatus,
    tracking_number: Option<&str>,
) -> Result<ShipmentRow, DbError> {
    let mut tx = pool.begin().await?;

    let current: Option<(i64, String)> =
        sqlx::query_as("SELECT user_id, status FROM shipments WHERE id = $1 FOR UPDATE")
            .bind(shipment_id)
            .fetch_optional(&mut *tx)
            .await?;
    let (user_id, status) = current.ok_or(DbError::NotFound)?;
    let current: ShipmentStatus = status.parse()?;
    current.transition(next, tracking_number)?;

    if next == ShipmentStatus::Cancelled {
        sqlx::query(
            "INSERT INTO user_cards (user_id, card_id, quantity) \
             SELECT $1, card_id, quantity FROM shipment_items WHERE shipment_id = $2 \
             ON CONFLICT (user_id, card_id) DO UPDATE SET \
                 quantity   = user_cards.quantity + EXCLUDED.quantity, \
                 updated_at = NOW()",
        )
        .bind(user_id)
        .bind(shipment_id)
        .execute(&mut *tx)
        .await?;
    }

    let is_shipping = next == ShipmentStatus::Shipped;
    let row = sqlx::query_as::<_, ShipmentRow>(&format!(
        "UPDATE shipments \
         SET status          = $2, \
             tracking_number = CASE WHEN $3::BOOL THEN $4 ELSE tracking_number END, \
             shipped_at      = CASE WHEN $3::BOOL THEN NOW() ELSE shipped_at END, \
             updated_at      = NOW() \
         WHERE id = $1 \
         RETURNING {SHIPMENT_COLUMNS}"
    ))
    .bind(shipment_id)
    .bind(next.as_str())
    .bind(is_shipping)
    .bind(tracking_number.map(str::trim))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        shipment_id,
        from = current.as_str(),
        to = next.as_str(),
        "shipment status updated"
    );
    Ok(row)
}

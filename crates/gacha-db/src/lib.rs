use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/gacha-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &gacha_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("insufficient points: required {required}, available {available}")]
    InsufficientPoints { required: i64, available: i64 },
    #[error("not enough copies of card {card_id} to ship")]
    InsufficientCards { card_id: i64 },
    #[error("request with idempotency key '{0}' was already processed")]
    DuplicateRequest(String),
    #[error("product {0} has no drawable cards")]
    EmptyPool(i64),
    #[error("{entity} {id} can no longer be modified (status '{status}')")]
    NotEditable {
        entity: &'static str,
        id: i64,
        status: String,
    },
    #[error(transparent)]
    Core(#[from] gacha_core::CoreError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table does not exist on a fresh database; treat
    // absence as zero applied.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Run a full health check: ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }
}

pub mod announcements;
pub mod cards;
pub mod gacha;
pub mod notifications;
pub mod products;
pub mod rankings;
pub mod seed;
pub mod shipments;
pub mod users;

pub use announcements::{
    create_announcement, delete_announcement, list_announcements, list_published_announcements,
    update_announcement, AnnouncementPatch, AnnouncementRow,
};
pub use cards::{
    create_card, deactivate_card, get_card, list_cards, update_card, CardFilters, CardPatch,
    CardRow, NewCard,
};
pub use gacha::{
    execute_draw, list_results_for_user, DrawOutcome, DrawRequest, DrawnCardRow, GachaResultRow,
};
pub use notifications::{
    cancel_notification, create_notification, list_notifications, list_sent_notifications,
    mark_due_notifications_sent, update_notification, NewNotification, NotificationPatch,
    NotificationRow,
};
pub use products::{
    create_product, get_open_product, get_product, get_product_by_slug, list_active_products,
    list_pool_cards, load_draw_pool, remove_pool_card, upsert_pool_card, NewProduct, PoolCardRow, ProductRow,
    ProductSummaryRow,
};
pub use rankings::{get_ranking_settings, list_ranking, update_ranking_settings, RankingRow};
pub use seed::{seed_catalog, SeedSummary};
pub use shipments::{
    create_shipment, get_shipment, list_shipment_items, list_shipments, list_shipments_for_user,
    update_shipment_status, NewShipment, ShipmentItemRow, ShipmentRow,
};
pub use users::{
    create_user, get_user, get_user_by_token_hash, grant_points, list_transactions,
    list_user_cards, TransactionRow, UserCardRow, UserRow,
};

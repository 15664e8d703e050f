//! Offline unit tests for gacha-db pool configuration, row types and errors.
//! These tests do not require a live database connection.

use gacha_core::{AppConfig, Environment, PointBalance, RarityTable};
use gacha_db::{load_draw_pool, DbError, PoolCardRow, PoolConfig, UserRow};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 3000),
        log_level: "info".to_string(),
        catalog_path: PathBuf::from("./config/catalog.yaml"),
        token_hash_salt: "salt".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        rate_limit_max_requests: 120,
        rate_limit_window_secs: 60,
        rarity_table: RarityTable::default(),
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

#[test]
fn user_row_exposes_point_balance() {
    use chrono::Utc;

    let row = UserRow {
        id: 1,
        display_name: "tester".to_string(),
        free_points: 300,
        paid_points: 1_200,
        level: 3,
        total_draws: 25,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    assert_eq!(row.balance(), PointBalance::new(300, 1_200));
    assert_eq!(row.balance().total(), 1_500);
}

#[test]
fn empty_pool_rows_build_an_empty_draw_pool() {
    let pool = load_draw_pool(&[]).expect("empty rows are not an error");
    assert!(pool.is_empty());
}

#[test]
fn pickup_flag_survives_pool_conversion() {
    let rows = vec![PoolCardRow {
        card_id: 9,
        name: "Featured".to_string(),
        rarity: "SSR".to_string(),
        image_url: Some("https://cdn.example/featured.png".to_string()),
        is_pickup: true,
    }];

    let pool = load_draw_pool(&rows).expect("valid rows");
    let ssr = pool.cards_of(gacha_core::Rarity::SSR);
    assert_eq!(ssr.len(), 1);
    assert!(ssr[0].is_pickup);
}

#[test]
fn insufficient_points_error_reports_both_amounts() {
    let err = DbError::InsufficientPoints {
        required: 3_000,
        available: 1_250,
    };
    let message = err.to_string();
    assert!(message.contains("3000"), "{message}");
    assert!(message.contains("1250"), "{message}");
}

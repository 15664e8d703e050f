pub mod app_config;
pub mod catalog;
pub mod config;
pub mod draw;
pub mod notifications;
pub mod ranking;
pub mod rarity;
pub mod shipments;
pub mod simulate;
pub mod token;
pub mod wallet;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use catalog::{load_catalog, parse_catalog, slugify, CardConfig, CatalogFile, ProductConfig};
pub use config::{load_app_config, load_app_config_from_env};
pub use draw::{draw, DrawCount, DrawPool, DrawnCard, PoolCard, PICKUP_RATE};
pub use notifications::NotificationStatus;
pub use ranking::{RankingMetric, RankingPeriod, RankingSettings};
pub use rarity::{Rarity, RarityTable};
pub use shipments::{normalize_lines, ShipmentLine, ShipmentStatus};
pub use simulate::{simulate, SimulationReport};
pub use token::{generate_token, hash_token};
pub use wallet::{level_for_draws, Deduction, PointBalance};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid rarity: {0}")]
    InvalidRarity(String),
    #[error("invalid rarity table: {0}")]
    InvalidRarityTable(String),
    #[error("draw count must be 1 or 10, got {0}")]
    InvalidDrawCount(u32),
    #[error("draw pool is empty")]
    EmptyPool,
    #[error("insufficient points: required {required}, available {available}")]
    InsufficientPoints { required: i64, available: i64 },
    #[error("invalid point amount: {0}")]
    InvalidAmount(i64),
    #[error("invalid shipment status: {0}")]
    InvalidShipmentStatus(String),
    #[error("cannot move shipment from {from} to {to}: {reason}")]
    InvalidShipmentTransition {
        from: &'static str,
        to: &'static str,
        reason: &'static str,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
    #[error("failed to read catalog file {path}: {source}")]
    CatalogFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse catalog file: {0}")]
    CatalogFileParse(#[from] serde_yaml::Error),
    #[error("catalog validation error: {0}")]
    Validation(String),
}

use crate::app_config::{AppConfig, Environment};
use crate::rarity::RarityTable;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function,
/// so parsing can be tested against a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let token_hash_salt = require("GACHA_TOKEN_HASH_SALT")?;

    let env = parse_environment(&or_default("GACHA_ENV", "development"))?;

    let bind_addr: SocketAddr =
        parse_as("GACHA_BIND_ADDR", &or_default("GACHA_BIND_ADDR", "0.0.0.0:3000"))?;
    let log_level = or_default("GACHA_LOG_LEVEL", "info");
    let catalog_path = PathBuf::from(or_default("GACHA_CATALOG_PATH", "./config/catalog.yaml"));

    let db_max_connections: u32 = parse_as(
        "GACHA_DB_MAX_CONNECTIONS",
        &or_default("GACHA_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parse_as(
        "GACHA_DB_MIN_CONNECTIONS",
        &or_default("GACHA_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs: u64 = parse_as(
        "GACHA_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("GACHA_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let rate_limit_max_requests: usize = parse_as(
        "GACHA_RATE_LIMIT_MAX_REQUESTS",
        &or_default("GACHA_RATE_LIMIT_MAX_REQUESTS", "120"),
    )?;
    let rate_limit_window_secs: u64 = parse_as(
        "GACHA_RATE_LIMIT_WINDOW_SECS",
        &or_default("GACHA_RATE_LIMIT_WINDOW_SECS", "60"),
    )?;
    if rate_limit_window_secs == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "GACHA_RATE_LIMIT_WINDOW_SECS".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    let ssr: f64 = parse_as("GACHA_RATE_SSR", &or_default("GACHA_RATE_SSR", "3"))?;
    let sr: f64 = parse_as("GACHA_RATE_SR", &or_default("GACHA_RATE_SR", "12"))?;
    let r: f64 = parse_as("GACHA_RATE_R", &or_default("GACHA_RATE_R", "35"))?;
    let n: f64 = parse_as("GACHA_RATE_N", &or_default("GACHA_RATE_N", "50"))?;
    let rarity_table = RarityTable::new(ssr, sr, r, n).map_err(|e| ConfigError::InvalidEnvVar {
        var: "GACHA_RATE_*".to_string(),
        reason: e.to_string(),
    })?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        catalog_path,
        token_hash_salt,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        rate_limit_max_requests,
        rate_limit_window_secs,
        rarity_table,
    })
}

fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "GACHA_ENV".to_string(),
            reason: format!("expected development, test or production, got '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

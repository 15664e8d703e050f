use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::rarity::Rarity;
use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardConfig {
    pub name: String,
    pub rarity: Rarity,
    pub image_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolEntryConfig {
    /// Name of a card declared in the `cards` section.
    pub card: String,
    #[serde(default)]
    pub pickup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub name: String,
    pub description: Option<String>,
    pub cost_per_draw: i64,
    pub pool: Vec<PoolEntryConfig>,
}

impl ProductConfig {
    #[must_use]
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub cards: Vec<CardConfig>,
    #[serde(default)]
    pub products: Vec<ProductConfig>,
}

/// Generate a URL-safe slug. Spaces become dashes; other non-ASCII-alphanumeric
/// characters are dropped.
#[must_use]
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                Some(c)
            } else if c.is_whitespace() || c == '_' {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Load and validate the card catalog from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_catalog(path: &Path) -> Result<CatalogFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::CatalogFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_catalog(&content)
}

/// Parse and validate catalog YAML already in memory.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed or fails validation.
pub fn parse_catalog(content: &str) -> Result<CatalogFile, ConfigError> {
    let catalog: CatalogFile =
        serde_yaml::from_str(content).map_err(ConfigError::CatalogFileParse)?;
    validate_catalog(&catalog)?;
    Ok(catalog)
}

fn validate_catalog(catalog: &CatalogFile) -> Result<(), ConfigError> {
    let mut card_names = HashSet::new();
    for card in &catalog.cards {
        if card.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "card name must be non-empty".to_string(),
            ));
        }
        if !card_names.insert(card.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate card name: '{}'",
                card.name
            )));
        }
    }

    let mut slugs = HashSet::new();
    for product in &catalog.products {
        let slug = product.slug();
        if slug.is_empty() {
            return Err(ConfigError::Validation(format!(
                "product '{}' produces an empty slug",
                product.name
            )));
        }
        if !slugs.insert(slug.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate product slug: '{}' (from product '{}')",
                slug, product.name
            )));
        }
        if product.cost_per_draw <= 0 {
            return Err(ConfigError::Validation(format!(
                "product '{}' has non-positive cost_per_draw {}",
                product.name, product.cost_per_draw
            )));
        }
        if product.pool.is_empty() {
            return Err(ConfigError::Validation(format!(
                "product '{}' has an empty pool",
                product.name
            )));
        }

        let mut pooled = HashSet::new();
        for entry in &product.pool {
            if !card_names.contains(entry.card.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "product '{}' references unknown card '{}'",
                    product.name, entry.card
                )));
            }
            if !pooled.insert(entry.card.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "product '{}' lists card '{}' twice",
                    product.name, entry.card
                )));
            }
        }
    }

    Ok(())
}

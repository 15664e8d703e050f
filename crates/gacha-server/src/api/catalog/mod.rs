//! Admin catalog handlers.
//!
//! - `GET    /api/v1/admin/cards`                          list cards
//! - `POST   /api/v1/admin/cards`                          create a card
//! - `GET    /api/v1/admin/cards/:id`                      one card
//! - `PATCH  /api/v1/admin/cards/:id`                      sparse update
//! - `DELETE /api/v1/admin/cards/:id`                      soft-delete
//! - `POST   /api/v1/admin/products`                       create a product
//! - `GET    /api/v1/admin/products/:id`                   product with its pool
//! - `PUT    /api/v1/admin/products/:id/pool`              add/flag a pool card
//! - `DELETE /api/v1/admin/products/:id/pool/:card_id`     remove a pool card

mod cards;
mod products;

pub(super) use cards::{create_card, deactivate_card, get_card, list_cards, update_card};
pub(super) use products::{create_product, get_product, remove_pool_card, upsert_pool_card};

use gacha_core::Rarity;

use super::{validation_error, ApiError};

/// Parse a rarity code, converting failures into a validation error.
fn parse_rarity(request_id: &str, value: &str) -> Result<Rarity, ApiError> {
    value
        .parse::<Rarity>()
        .map_err(|_| validation_error(request_id, format!("rarity must be N, R, SR or SSR, got '{value}'")))
}

/// Accepts only absolute `http(s)` URLs for card art.
fn validate_image_url(request_id: &str, value: &str) -> Result<(), ApiError> {
    let ok = (value.starts_with("https://") || value.starts_with("http://"))
        && !value.contains(char::is_whitespace);
    if ok {
        Ok(())
    } else {
        Err(validation_error(
            request_id,
            format!("'image_url' must be an absolute http(s) URL, got '{value}'"),
        ))
    }
}

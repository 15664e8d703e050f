//! Draw execution: the whole debit-draw-persist sequence runs in one
//! transaction with the user row locked, so concurrent requests for the same
//! user serialize and a failure anywhere leaves no partial writes.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use gacha_core::{level_for_draws, DrawCount, PointBalance, RarityTable};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::products::{get_open_product, list_pool_cards, load_draw_pool, PoolCardRow};
use crate::DbError;

#[derive(Debug, Clone, Copy)]
pub struct DrawRequest<'a> {
    pub user_id: i64,
    pub product_id: i64,
    pub count: DrawCount,
    /// Client-supplied key; a repeated key for the same user is rejected.
    pub idempotency_key: Option<&'a str>,
}

/// One card from an executed draw, enriched for display.
#[derive(Debug, Clone)]
pub struct DrawnCardRow {
    pub index: usize,
    pub card_id: i64,
    pub name: String,
    pub rarity: String,
    pub image_url: Option<String>,
    pub is_pickup: bool,
    pub was_guaranteed: bool,
    /// The user did not hold this card before this draw.
    pub is_new: bool,
}

#[derive(Debug, Clone)]
pub struct DrawOutcome {
    pub batch_id: Uuid,
    pub product_id: i64,
    pub cost: i64,
    pub balance: PointBalance,
    pub level: i32,
    pub cards: Vec<DrawnCardRow>,
}

/// A persisted row from `gacha_results` joined with the card name.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GachaResultRow {
    pub id: i64,
    pub product_id: i64,
    pub card_id: i64,
    pub card_name: String,
    pub rarity: String,
    pub draw_batch_id: Uuid,
    pub draw_index: i32,
    pub is_pickup: bool,
    pub was_guaranteed: bool,
    pub created_at: DateTime<Utc>,
}

/// Executes a draw for a user.
///
/// Steps, all inside one transaction:
/// 1. lock the user row (`FOR UPDATE`);
/// 2. reject a replayed idempotency key;
/// 3. load the open product and its pool;
/// 4. debit `cost_per_draw * count`, free points first;
/// 5. run the draw engine;
/// 6. insert `gacha_results`, upsert `user_cards`, insert the ledger row;
/// 7. update balance, draw count and level.
///
/// # Errors
///
/// - [`DbError::NotFound`] if the user or open product does not exist
/// - [`DbError::DuplicateRequest`] for a replayed idempotency key
/// - [`DbError::EmptyPool`] if the product has no active cards
/// - [`DbError::InsufficientPoints`] if the balance cannot cover the cost
/// - [`DbError::Sqlx`] on query failure
///
/// Every error rolls the transaction back.
pub async fn execute_draw<R>(
    pool: &PgPool,
    request: DrawRequest<'_>,
    table: &RarityTable,
    rng: &mut R,
) -> Result<DrawOutcome, DbError>
where
    R: Rng + Send + ?Sized,
{
    let mut tx = pool.begin().await?;

    let user: Option<(i64, i64, i64)> = sqlx::query_as(
        "SELECT free_points, paid_points, total_draws FROM users \
         WHERE id = $1 AND is_active \
         FOR UPDATE",
    )
    .bind(request.user_id)
    .fetch_optional(&mut *tx)
    .await?;
    let (free, paid, total_draws) = user.ok_or(DbError::NotFound)?;

    if let Some(key) = request.idempotency_key {
        let seen: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM transactions WHERE user_id = $1 AND idempotency_key = $2",
        )
        .bind(request.user_id)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;
        if seen.is_some() {
            return Err(DbError::DuplicateRequest(key.to_string()));
        }
    }

    let product = get_open_product(&mut *tx, request.product_id)
        .await?
        .ok_or(DbError::NotFound)?;

    let pool_rows = list_pool_cards(&mut *tx, product.id).await?;
    let draw_pool = load_draw_pool(&pool_rows)?;
    if draw_pool.is_empty() {
        return Err(DbError::EmptyPool(product.id));
    }

    let draws = i64::try_from(request.count.get()).unwrap_or(i64::MAX);
    let cost = product.cost_per_draw.saturating_mul(draws);
    let deduction = PointBalance::new(free, paid)
        .deduct(cost)
        .map_err(|e| match e {
            gacha_core::CoreError::InsufficientPoints {
                required,
                available,
            } => DbError::InsufficientPoints {
                required,
                available,
            },
            other => DbError::Core(other),
        })?;

    let drawn = gacha_core::draw(&draw_pool, request.count, table, rng)?;
    let batch_id = Uuid::new_v4();

    let card_ids: Vec<i64> = drawn.iter().map(|c| c.card_id).collect();
    let already_owned: HashSet<i64> = sqlx::query_scalar::<_, i64>(
        "SELECT card_id FROM user_cards \
         WHERE user_id = $1 AND card_id = ANY($2) AND quantity > 0",
    )
    .bind(request.user_id)
    .bind(&card_ids)
    .fetch_all(&mut *tx)
    .await?
    .into_iter()
    .collect();

    for card in &drawn {
        sqlx::query(
            "INSERT INTO gacha_results \
                 (user_id, product_id, card_id, rarity, draw_batch_id, draw_index, \
                  is_pickup, was_guaranteed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(request.user_id)
        .bind(product.id)
        .bind(card.card_id)
        .bind(card.rarity.as_str())
        .bind(batch_id)
        .bind(i32::try_from(card.index).unwrap_or(i32::MAX))
        .bind(card.is_pickup)
        .bind(card.was_guaranteed)
        .execute(&mut *tx)
        .await?;
    }

    let mut quantities: BTreeMap<i64, i32> = BTreeMap::new();
    for card in &drawn {
        *quantities.entry(card.card_id).or_insert(0) += 1;
    }
    for (card_id, quantity) in &quantities {
        sqlx::query(
            "INSERT INTO user_cards (user_id, card_id, quantity) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, card_id) DO UPDATE SET \
                 quantity   = user_cards.quantity + EXCLUDED.quantity, \
                 updated_at = NOW()",
        )
        .bind(request.user_id)
        .bind(card_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;
    }

    let remaining = deduction.remaining;
    sqlx::query(
        "INSERT INTO transactions \
             (user_id, kind, free_delta, paid_delta, balance_after, draw_batch_id, \
              idempotency_key, note) \
         VALUES ($1, 'gacha', $2, $3, $4, $5, $6, $7)",
    )
    .bind(request.user_id)
    .bind(-deduction.from_free)
    .bind(-deduction.from_paid)
    .bind(remaining.total())
    .bind(batch_id)
    .bind(request.idempotency_key)
    .bind(format!("{} x{}", product.name, request.count.get()))
    .execute(&mut *tx)
    .await?;

    let new_total_draws = total_draws.saturating_add(draws);
    let level = level_for_draws(new_total_draws);
    sqlx::query(
        "UPDATE users \
         SET free_points = $2, paid_points = $3, total_draws = $4, level = $5, \
             updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(request.user_id)
    .bind(remaining.free)
    .bind(remaining.paid)
    .bind(new_total_draws)
    .bind(level)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = request.user_id,
        product_id = product.id,
        batch_id = %batch_id,
        count = request.count.get(),
        cost,
        "gacha draw executed"
    );

    let by_id: HashMap<i64, &PoolCardRow> = pool_rows.iter().map(|r| (r.card_id, r)).collect();
    let mut seen_in_batch: HashSet<i64> = HashSet::new();
    let cards = drawn
        .iter()
        .map(|card| {
            let meta = by_id.get(&card.card_id);
            let is_new = !already_owned.contains(&card.card_id) && seen_in_batch.insert(card.card_id);
            DrawnCardRow {
                index: card.index,
                card_id: card.card_id,
                name: meta.map(|m| m.name.clone()).unwrap_or_default(),
                rarity: card.rarity.as_str().to_string(),
                image_url: meta.and_then(|m| m.image_url.clone()),
                is_pickup: card.is_pickup,
                was_guaranteed: card.was_guaranteed,
                is_new,
            }
        })
        .collect();

    Ok(DrawOutcome {
        batch_id,
        product_id: product.id,
        cost,
        balance: remaining,
        level,
        cards,
    })
}

/// Newest-first draw history for a user.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_results_for_user(
    pool: &PgPool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<GachaResultRow>, DbError> {
    let rows = sqlx::query_as::<_, GachaResultRow>(
        "SELECT gr.id, gr.product_id, gr.card_id, c.name AS card_name, gr.rarity, \
                gr.draw_batch_id, gr.draw_index, gr.is_pickup, gr.was_guaranteed, gr.created_at \
         FROM gacha_results gr \
         JOIN cards c ON c.id = gr.card_id \
         WHERE gr.user_id = $1 \
         ORDER BY gr.created_at DESC, gr.draw_batch_id, gr.draw_index \
         LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

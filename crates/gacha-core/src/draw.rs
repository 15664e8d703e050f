//! The draw engine: rarity sampling, 10-draw guarantee, pickup selection and
//! empty-tier fallback.
//!
//! Randomness is always injected so callers (and tests) control the source.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::rarity::{Rarity, RarityTable};
use crate::CoreError;

/// Probability that an SSR outcome is redirected to the pickup subset.
pub const PICKUP_RATE: f64 = 0.5;

/// Fallback order for an ordinary draw: lowest rarity first.
const FALLBACK_ORDER: [Rarity; 4] = [Rarity::N, Rarity::R, Rarity::SR, Rarity::SSR];

/// Fallback order for a guaranteed draw: SR+ first, then the rest.
const GUARANTEED_FALLBACK_ORDER: [Rarity; 4] = [Rarity::SR, Rarity::SSR, Rarity::N, Rarity::R];

/// A card as it participates in a product's draw pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCard {
    pub card_id: i64,
    pub rarity: Rarity,
    pub is_pickup: bool,
}

/// Cards of one gacha product, grouped by rarity.
#[derive(Debug, Clone, Default)]
pub struct DrawPool {
    by_rarity: BTreeMap<Rarity, Vec<PoolCard>>,
}

impl DrawPool {
    #[must_use]
    pub fn new(cards: impl IntoIterator<Item = PoolCard>) -> Self {
        let mut by_rarity: BTreeMap<Rarity, Vec<PoolCard>> = BTreeMap::new();
        for card in cards {
            by_rarity.entry(card.rarity).or_default().push(card);
        }
        Self { by_rarity }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_rarity.values().all(Vec::is_empty)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_rarity.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn cards_of(&self, rarity: Rarity) -> &[PoolCard] {
        self.by_rarity.get(&rarity).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn has_sr_or_above(&self) -> bool {
        !self.cards_of(Rarity::SR).is_empty() || !self.cards_of(Rarity::SSR).is_empty()
    }

    /// Number of cards per rarity, lowest first.
    #[must_use]
    pub fn counts(&self) -> [(Rarity, usize); 4] {
        Rarity::ALL.map(|r| (r, self.cards_of(r).len()))
    }

    fn pickup_ssr(&self) -> impl Iterator<Item = &PoolCard> {
        self.cards_of(Rarity::SSR).iter().filter(|c| c.is_pickup)
    }
}

/// How many cards one execute request draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DrawCount {
    Single,
    Ten,
}

impl DrawCount {
    #[must_use]
    pub fn get(self) -> usize {
        match self {
            DrawCount::Single => 1,
            DrawCount::Ten => 10,
        }
    }
}

impl TryFrom<u32> for DrawCount {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DrawCount::Single),
            10 => Ok(DrawCount::Ten),
            other => Err(CoreError::InvalidDrawCount(other)),
        }
    }
}

impl From<DrawCount> for u32 {
    fn from(value: DrawCount) -> Self {
        match value {
            DrawCount::Single => 1,
            DrawCount::Ten => 10,
        }
    }
}

/// One card produced by [`draw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawnCard {
    pub index: usize,
    pub card_id: i64,
    pub rarity: Rarity,
    pub is_pickup: bool,
    pub was_guaranteed: bool,
}

/// Run `count` draws against `pool`.
///
/// In a 10-draw, the last draw is resampled from [`RarityTable::guaranteed`]
/// when none of the first nine delivered an SR or SSR card. The check uses the
/// rarity actually delivered after fallback.
///
/// # Errors
///
/// Returns [`CoreError::EmptyPool`] if the pool has no cards at all.
pub fn draw<R: Rng + ?Sized>(
    pool: &DrawPool,
    count: DrawCount,
    table: &RarityTable,
    rng: &mut R,
) -> Result<Vec<DrawnCard>, CoreError> {
    if pool.is_empty() {
        return Err(CoreError::EmptyPool);
    }

    let total = count.get();
    let mut drawn = Vec::with_capacity(total);
    let mut has_sr_plus = false;

    for index in 0..total {
        let guaranteed = total == 10 && index == total - 1 && !has_sr_plus;
        let rarity = if guaranteed {
            RarityTable::guaranteed().sample(roll(rng))
        } else {
            table.sample(roll(rng))
        };

        let card = pick_card(pool, rarity, guaranteed, rng)?;
        has_sr_plus |= card.rarity.is_sr_or_above();

        drawn.push(DrawnCard {
            index,
            card_id: card.card_id,
            rarity: card.rarity,
            is_pickup: card.is_pickup,
            was_guaranteed: guaranteed,
        });
    }

    Ok(drawn)
}

fn roll<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    rng.random::<f64>() * 100.0
}

fn pick_card<R: Rng + ?Sized>(
    pool: &DrawPool,
    rarity: Rarity,
    guaranteed: bool,
    rng: &mut R,
) -> Result<PoolCard, CoreError> {
    if rarity == Rarity::SSR {
        let pickup: Vec<&PoolCard> = pool.pickup_ssr().collect();
        if !pickup.is_empty() && rng.random_bool(PICKUP_RATE) {
            return Ok(*pickup[rng.random_range(0..pickup.len())]);
        }
    }

    let cards = pool.cards_of(rarity);
    if !cards.is_empty() {
        return Ok(cards[rng.random_range(0..cards.len())]);
    }

    let order = if guaranteed {
        GUARANTEED_FALLBACK_ORDER
    } else {
        FALLBACK_ORDER
    };

    order
        .iter()
        .map(|r| pool.cards_of(*r))
        .find(|cards| !cards.is_empty())
        .map(|cards| cards[rng.random_range(0..cards.len())])
        .ok_or(CoreError::EmptyPool)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn card(card_id: i64, rarity: Rarity, is_pickup: bool) -> PoolCard {
        PoolCard {
            card_id,
            rarity,
            is_pickup,
        }
    }

    fn full_pool() -> DrawPool {
        DrawPool::new([
            card(1, Rarity::N, false),
            card(2, Rarity::N, false),
            card(3, Rarity::R, false),
            card(4, Rarity::R, false),
            card(5, Rarity::SR, false),
            card(6, Rarity::SR, false),
            card(7, Rarity::SSR, false),
            card(8, Rarity::SSR, true),
        ])
    }

    #[test]
    fn draw_count_accepts_only_one_or_ten() {
        assert_eq!(DrawCount::try_from(1).unwrap(), DrawCount::Single);
        assert_eq!(DrawCount::try_from(10).unwrap(), DrawCount::Ten);
        assert!(matches!(
            DrawCount::try_from(5),
            Err(CoreError::InvalidDrawCount(5))
        ));
    }

    #[test]
    fn draw_count_deserializes_from_number() {
        let count: DrawCount = serde_json::from_str("10").unwrap();
        assert_eq!(count, DrawCount::Ten);
        assert!(serde_json::from_str::<DrawCount>("3").is_err());
    }

    #[test]
    fn empty_pool_is_an_error() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = draw(
            &DrawPool::default(),
            DrawCount::Single,
            &RarityTable::default(),
            &mut rng,
        );
        assert!(matches!(result, Err(CoreError::EmptyPool)));
    }

    #[test]
    fn single_draw_returns_one_card_from_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = full_pool();
        let cards = draw(&pool, DrawCount::Single, &RarityTable::default(), &mut rng).unwrap();
        assert_eq!(cards.len(), 1);
        assert!((1..=8).contains(&cards[0].card_id));
        assert!(!cards[0].was_guaranteed);
    }

    #[test]
    fn every_ten_draw_contains_sr_or_above() {
        let mut rng = StdRng::seed_from_u64(42);
        let pool = full_pool();
        let table = RarityTable::default();
        for _ in 0..2_000 {
            let cards = draw(&pool, DrawCount::Ten, &table, &mut rng).unwrap();
            assert_eq!(cards.len(), 10);
            assert!(
                cards.iter().any(|c| c.rarity.is_sr_or_above()),
                "batch without SR+: {cards:?}"
            );
        }
    }

    #[test]
    fn guarantee_triggers_only_on_last_draw_without_prior_sr() {
        // A table that never yields SR+ on its own forces the guarantee every time.
        let table = RarityTable::new(0.0, 0.0, 50.0, 50.0).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let cards = draw(&full_pool(), DrawCount::Ten, &table, &mut rng).unwrap();

        for c in &cards[..9] {
            assert!(!c.was_guaranteed);
            assert!(!c.rarity.is_sr_or_above());
        }
        assert!(cards[9].was_guaranteed);
        assert!(cards[9].rarity.is_sr_or_above());
    }

    #[test]
    fn guarantee_not_applied_when_sr_already_drawn() {
        let table = RarityTable::new(0.0, 100.0, 0.0, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let cards = draw(&full_pool(), DrawCount::Ten, &table, &mut rng).unwrap();
        assert!(cards.iter().all(|c| !c.was_guaranteed));
    }

    #[test]
    fn single_draws_are_never_guaranteed() {
        let table = RarityTable::new(0.0, 0.0, 0.0, 100.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let cards = draw(&full_pool(), DrawCount::Single, &table, &mut rng).unwrap();
            assert_eq!(cards[0].rarity, Rarity::N);
            assert!(!cards[0].was_guaranteed);
        }
    }

    #[test]
    fn guaranteed_split_is_roughly_eighty_twenty() {
        let table = RarityTable::new(0.0, 0.0, 0.0, 100.0).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);
        let mut ssr = 0usize;
        let batches = 10_000;
        for _ in 0..batches {
            let cards = draw(&full_pool(), DrawCount::Ten, &table, &mut rng).unwrap();
            if cards[9].rarity == Rarity::SSR {
                ssr += 1;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = ssr as f64 / f64::from(batches);
        assert!((0.18..0.22).contains(&ratio), "SSR ratio {ratio}");
    }

    #[test]
    fn pickup_receives_about_half_of_ssr_plus_its_uniform_share() {
        let table = RarityTable::new(100.0, 0.0, 0.0, 0.0).unwrap();
        let pool = DrawPool::new([
            card(10, Rarity::SSR, true),
            card(11, Rarity::SSR, false),
            card(12, Rarity::SSR, false),
            card(13, Rarity::SSR, false),
        ]);
        let mut rng = StdRng::seed_from_u64(5);
        let draws = 20_000;
        let mut pickup_hits = 0usize;
        for _ in 0..draws {
            let cards = draw(&pool, DrawCount::Single, &table, &mut rng).unwrap();
            if cards[0].card_id == 10 {
                assert!(cards[0].is_pickup);
                pickup_hits += 1;
            }
        }
        // 0.5 (coin flip) + 0.5 * 1/4 (uniform share) = 0.625
        #[allow(clippy::cast_precision_loss)]
        let ratio = pickup_hits as f64 / f64::from(draws);
        assert!((0.60..0.65).contains(&ratio), "pickup ratio {ratio}");
    }

    #[test]
    fn missing_rarity_falls_back_to_lowest_available() {
        let table = RarityTable::new(100.0, 0.0, 0.0, 0.0).unwrap();
        let pool = DrawPool::new([card(20, Rarity::R, false), card(21, Rarity::SR, false)]);
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..50 {
            let cards = draw(&pool, DrawCount::Single, &table, &mut rng).unwrap();
            assert_eq!(cards[0].card_id, 20);
        }
    }

    #[test]
    fn guaranteed_fallback_prefers_sr_plus() {
        // No SSR cards: guaranteed SSR outcome must fall back to SR, not N.
        let table = RarityTable::new(0.0, 0.0, 0.0, 100.0).unwrap();
        let pool = DrawPool::new([card(30, Rarity::N, false), card(31, Rarity::SR, false)]);
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..200 {
            let cards = draw(&pool, DrawCount::Ten, &table, &mut rng).unwrap();
            assert_eq!(cards[9].card_id, 31);
        }
    }

    #[test]
    fn pool_without_sr_cannot_satisfy_guarantee() {
        let pool = DrawPool::new([card(40, Rarity::N, false)]);
        assert!(!pool.has_sr_or_above());
        let mut rng = StdRng::seed_from_u64(17);
        let cards = draw(&pool, DrawCount::Ten, &RarityTable::default(), &mut rng).unwrap();
        assert!(cards.iter().all(|c| c.card_id == 40));
        assert!(cards[9].was_guaranteed);
    }

    #[test]
    fn pool_counts_by_rarity() {
        let counts = full_pool().counts();
        assert_eq!(
            counts,
            [
                (Rarity::N, 2),
                (Rarity::R, 2),
                (Rarity::SR, 2),
                (Rarity::SSR, 2)
            ]
        );
        assert_eq!(full_pool().len(), 8);
    }
}

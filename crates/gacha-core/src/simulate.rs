//! Offline Monte Carlo runs of the draw engine, used by the CLI to sanity
//! check a rate table against a real pool.

use rand::Rng;
use serde::Serialize;

use crate::draw::{draw, DrawCount, DrawPool};
use crate::rarity::{Rarity, RarityTable};
use crate::CoreError;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    pub batches: u64,
    pub cards: u64,
    pub n: u64,
    pub r: u64,
    pub sr: u64,
    pub ssr: u64,
    pub pickup: u64,
    pub guaranteed: u64,
    /// Batches with no SR+ card at all. Always zero for 10-draws against a
    /// pool that contains an SR or SSR card.
    pub batches_without_sr_plus: u64,
}

impl SimulationReport {
    #[must_use]
    pub fn count(&self, rarity: Rarity) -> u64 {
        match rarity {
            Rarity::N => self.n,
            Rarity::R => self.r,
            Rarity::SR => self.sr,
            Rarity::SSR => self.ssr,
        }
    }

    /// Observed share of `rarity` in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn observed_rate(&self, rarity: Rarity) -> f64 {
        if self.cards == 0 {
            return 0.0;
        }
        self.count(rarity) as f64 * 100.0 / self.cards as f64
    }

    fn record(&mut self, rarity: Rarity) {
        match rarity {
            Rarity::N => self.n += 1,
            Rarity::R => self.r += 1,
            Rarity::SR => self.sr += 1,
            Rarity::SSR => self.ssr += 1,
        }
    }
}

/// Run `batches` executions of `count` draws each.
///
/// # Errors
///
/// Propagates [`CoreError::EmptyPool`] from the draw engine.
pub fn simulate<R: Rng + ?Sized>(
    pool: &DrawPool,
    count: DrawCount,
    table: &RarityTable,
    batches: u64,
    rng: &mut R,
) -> Result<SimulationReport, CoreError> {
    let mut report = SimulationReport::default();

    for _ in 0..batches {
        let cards = draw(pool, count, table, rng)?;
        report.batches += 1;
        if !cards.iter().any(|c| c.rarity.is_sr_or_above()) {
            report.batches_without_sr_plus += 1;
        }
        for card in cards {
            report.cards += 1;
            report.record(card.rarity);
            if card.is_pickup {
                report.pickup += 1;
            }
            if card.was_guaranteed {
                report.guaranteed += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::draw::PoolCard;

    fn pool() -> DrawPool {
        DrawPool::new(
            [
                (1, Rarity::N),
                (2, Rarity::R),
                (3, Rarity::SR),
                (4, Rarity::SSR),
            ]
            .map(|(card_id, rarity)| PoolCard {
                card_id,
                rarity,
                is_pickup: false,
            }),
        )
    }

    #[test]
    fn single_draw_frequencies_match_table() {
        let mut rng = StdRng::seed_from_u64(20_261_015);
        let table = RarityTable::default();
        let report = simulate(&pool(), DrawCount::Single, &table, 200_000, &mut rng).unwrap();

        assert_eq!(report.cards, 200_000);
        for rarity in Rarity::ALL {
            let observed = report.observed_rate(rarity);
            let expected = table.rate(rarity);
            assert!(
                (observed - expected).abs() < 0.5,
                "{rarity}: observed {observed:.3}% expected {expected}%"
            );
        }
        assert_eq!(report.guaranteed, 0);
    }

    #[test]
    fn ten_draw_batches_always_have_sr_plus() {
        let mut rng = StdRng::seed_from_u64(99);
        let report =
            simulate(&pool(), DrawCount::Ten, &RarityTable::default(), 5_000, &mut rng).unwrap();
        assert_eq!(report.batches, 5_000);
        assert_eq!(report.cards, 50_000);
        assert_eq!(report.batches_without_sr_plus, 0);
        // P(no SR+ in nine draws) = 0.85^9 ≈ 23%.
        assert!(report.guaranteed > 1_000 && report.guaranteed < 1_350);
    }

    #[test]
    fn empty_report_has_zero_rates() {
        assert!(SimulationReport::default().observed_rate(Rarity::SSR).abs() < f64::EPSILON);
    }
}

//! Point balances. Users hold free (granted) and paid points; spending
//! always consumes free points first.

use serde::{Deserialize, Serialize};

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PointBalance {
    pub free: i64,
    pub paid: i64,
}

/// How a cost was split across the two buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deduction {
    pub from_free: i64,
    pub from_paid: i64,
    pub remaining: PointBalance,
}

impl PointBalance {
    #[must_use]
    pub fn new(free: i64, paid: i64) -> Self {
        Self { free, paid }
    }

    #[must_use]
    pub fn total(&self) -> i64 {
        self.free.saturating_add(self.paid)
    }

    /// Spend `cost` points, free first. The balance is left untouched on error.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAmount`] for a negative cost and
    /// [`CoreError::InsufficientPoints`] when the total balance is short.
    pub fn deduct(&self, cost: i64) -> Result<Deduction, CoreError> {
        if cost < 0 {
            return Err(CoreError::InvalidAmount(cost));
        }

        let available = self.total();
        if available < cost {
            return Err(CoreError::InsufficientPoints {
                required: cost,
                available,
            });
        }

        let from_free = cost.min(self.free.max(0));
        let from_paid = cost - from_free;

        Ok(Deduction {
            from_free,
            from_paid,
            remaining: PointBalance {
                free: self.free - from_free,
                paid: self.paid - from_paid,
            },
        })
    }

    /// Add points to both buckets.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidAmount`] for negative grants or overflow.
    pub fn grant(&self, free: i64, paid: i64) -> Result<PointBalance, CoreError> {
        if free < 0 {
            return Err(CoreError::InvalidAmount(free));
        }
        if paid < 0 {
            return Err(CoreError::InvalidAmount(paid));
        }

        let free_total = self
            .free
            .checked_add(free)
            .ok_or(CoreError::InvalidAmount(free))?;
        let paid_total = self
            .paid
            .checked_add(paid)
            .ok_or(CoreError::InvalidAmount(paid))?;

        Ok(PointBalance {
            free: free_total,
            paid: paid_total,
        })
    }
}

/// Level derived from the lifetime number of draws.
#[must_use]
pub fn level_for_draws(total_draws: i64) -> i32 {
    let level = 1 + total_draws.max(0) / 10;
    i32::try_from(level.min(999)).unwrap_or(999)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduct_uses_free_points_first() {
        let balance = PointBalance::new(300, 1_000);
        let d = balance.deduct(200).unwrap();
        assert_eq!(d.from_free, 200);
        assert_eq!(d.from_paid, 0);
        assert_eq!(d.remaining, PointBalance::new(100, 1_000));
    }

    #[test]
    fn deduct_spills_into_paid() {
        let balance = PointBalance::new(300, 1_000);
        let d = balance.deduct(500).unwrap();
        assert_eq!(d.from_free, 300);
        assert_eq!(d.from_paid, 200);
        assert_eq!(d.remaining, PointBalance::new(0, 800));
    }

    #[test]
    fn deduct_exact_balance_leaves_zero() {
        let d = PointBalance::new(100, 50).deduct(150).unwrap();
        assert_eq!(d.remaining.total(), 0);
    }

    #[test]
    fn deduct_rejects_insufficient_points() {
        let balance = PointBalance::new(100, 50);
        let err = balance.deduct(151).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InsufficientPoints {
                required: 151,
                available: 150
            }
        ));
        assert_eq!(balance, PointBalance::new(100, 50));
    }

    #[test]
    fn deduct_rejects_negative_cost() {
        assert!(matches!(
            PointBalance::new(10, 10).deduct(-1),
            Err(CoreError::InvalidAmount(-1))
        ));
    }

    #[test]
    fn deduct_never_goes_negative() {
        let balance = PointBalance::new(7, 13);
        for cost in 0..=20 {
            let d = balance.deduct(cost).unwrap();
            assert!(d.remaining.free >= 0);
            assert!(d.remaining.paid >= 0);
            assert_eq!(d.from_free + d.from_paid, cost);
        }
        assert!(balance.deduct(21).is_err());
    }

    #[test]
    fn grant_adds_to_buckets() {
        let b = PointBalance::new(1, 2).grant(10, 20).unwrap();
        assert_eq!(b, PointBalance::new(11, 22));
    }

    #[test]
    fn grant_rejects_negative_and_overflow() {
        assert!(PointBalance::new(0, 0).grant(-5, 0).is_err());
        assert!(PointBalance::new(i64::MAX, 0).grant(1, 0).is_err());
    }

    #[test]
    fn level_grows_every_ten_draws() {
        assert_eq!(level_for_draws(0), 1);
        assert_eq!(level_for_draws(9), 1);
        assert_eq!(level_for_draws(10), 2);
        assert_eq!(level_for_draws(125), 13);
        assert_eq!(level_for_draws(1_000_000), 999);
    }
}

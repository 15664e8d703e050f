//! Rarity tiers and the probability table used to sample them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Tolerance allowed when checking that a table sums to 100%.
const RATE_SUM_EPSILON: f64 = 1e-6;

/// Card rarity tier, ordered from most common to rarest.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rarity {
    N,
    R,
    SR,
    SSR,
}

impl Rarity {
    /// All tiers, lowest first.
    pub const ALL: [Rarity; 4] = [Rarity::N, Rarity::R, Rarity::SR, Rarity::SSR];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Rarity::N => "N",
            Rarity::R => "R",
            Rarity::SR => "SR",
            Rarity::SSR => "SSR",
        }
    }

    #[must_use]
    pub fn is_sr_or_above(self) -> bool {
        self >= Rarity::SR
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rarity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "N" => Ok(Rarity::N),
            "R" => Ok(Rarity::R),
            "SR" => Ok(Rarity::SR),
            "SSR" => Ok(Rarity::SSR),
            _ => Err(CoreError::InvalidRarity(s.to_string())),
        }
    }
}

/// Per-tier draw probabilities, expressed in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RarityTable {
    ssr: f64,
    sr: f64,
    r: f64,
    n: f64,
}

impl Default for RarityTable {
    /// SSR 3%, SR 12%, R 35%, N 50%.
    fn default() -> Self {
        Self {
            ssr: 3.0,
            sr: 12.0,
            r: 35.0,
            n: 50.0,
        }
    }
}

impl RarityTable {
    /// Build a validated table. Every rate must be finite and non-negative,
    /// and the rates must sum to 100.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRarityTable`] when the rates are unusable.
    pub fn new(ssr: f64, sr: f64, r: f64, n: f64) -> Result<Self, CoreError> {
        for (tier, rate) in [("SSR", ssr), ("SR", sr), ("R", r), ("N", n)] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(CoreError::InvalidRarityTable(format!(
                    "{tier} rate must be a non-negative number, got {rate}"
                )));
            }
        }

        let sum = ssr + sr + r + n;
        if (sum - 100.0).abs() > RATE_SUM_EPSILON {
            return Err(CoreError::InvalidRarityTable(format!(
                "rates must sum to 100, got {sum}"
            )));
        }

        Ok(Self { ssr, sr, r, n })
    }

    /// Table used for a guaranteed draw: SR 80%, SSR 20%.
    #[must_use]
    pub fn guaranteed() -> Self {
        Self {
            ssr: 20.0,
            sr: 80.0,
            r: 0.0,
            n: 0.0,
        }
    }

    #[must_use]
    pub fn rate(&self, rarity: Rarity) -> f64 {
        match rarity {
            Rarity::SSR => self.ssr,
            Rarity::SR => self.sr,
            Rarity::R => self.r,
            Rarity::N => self.n,
        }
    }

    /// Cumulative sampling. `roll` is a value in `[0, 100)`; tiers are walked
    /// rarest first and the first one whose cumulative rate exceeds the roll
    /// wins. Rolls past the last boundary (float rounding) land on N.
    #[must_use]
    pub fn sample(&self, roll: f64) -> Rarity {
        let mut cumulative = 0.0;
        for rarity in Rarity::ALL.iter().rev() {
            cumulative += self.rate(*rarity);
            if roll < cumulative {
                return *rarity;
            }
        }
        Rarity::N
    }

    /// Rates as `(rarity, percent)` pairs, rarest first. Used for display.
    #[must_use]
    pub fn entries(&self) -> [(Rarity, f64); 4] {
        [
            (Rarity::SSR, self.ssr),
            (Rarity::SR, self.sr),
            (Rarity::R, self.r),
            (Rarity::N, self.n),
        ]
    }
}

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

pub const MAX_TOP_N: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPeriod {
    Daily,
    Weekly,
    Monthly,
    AllTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    Draws,
    PointsSpent,
    SsrCount,
}

impl RankingPeriod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RankingPeriod::Daily => "daily",
            RankingPeriod::Weekly => "weekly",
            RankingPeriod::Monthly => "monthly",
            RankingPeriod::AllTime => "all_time",
        }
    }

    /// Start of the window containing `now` (UTC). Weeks start on Monday.
    /// `AllTime` has no lower bound.
    #[must_use]
    pub fn window_start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let midnight = |date: chrono::NaiveDate| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        let today = now.date_naive();
        match self {
            RankingPeriod::Daily => Some(midnight(today)),
            RankingPeriod::Weekly => {
                let back = i64::from(today.weekday().num_days_from_monday());
                Some(midnight(today - Duration::days(back)))
            }
            RankingPeriod::Monthly => today.with_day(1).map(midnight),
            RankingPeriod::AllTime => None,
        }
    }
}

impl FromStr for RankingPeriod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(RankingPeriod::Daily),
            "weekly" => Ok(RankingPeriod::Weekly),
            "monthly" => Ok(RankingPeriod::Monthly),
            "all_time" => Ok(RankingPeriod::AllTime),
            other => Err(CoreError::Validation(format!(
                "period must be daily, weekly, monthly or all_time, got '{other}'"
            ))),
        }
    }
}

impl RankingMetric {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RankingMetric::Draws => "draws",
            RankingMetric::PointsSpent => "points_spent",
            RankingMetric::SsrCount => "ssr_count",
        }
    }
}

impl FromStr for RankingMetric {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draws" => Ok(RankingMetric::Draws),
            "points_spent" => Ok(RankingMetric::PointsSpent),
            "ssr_count" => Ok(RankingMetric::SsrCount),
            other => Err(CoreError::Validation(format!(
                "metric must be draws, points_spent or ssr_count, got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingSettings {
    pub is_enabled: bool,
    pub period: RankingPeriod,
    pub metric: RankingMetric,
    pub top_n: i32,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            is_enabled: true,
            period: RankingPeriod::Weekly,
            metric: RankingMetric::Draws,
            top_n: 10,
        }
    }
}

impl RankingSettings {
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] if `top_n` is outside `1..=100`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if (1..=MAX_TOP_N).contains(&self.top_n) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "top_n must be between 1 and {MAX_TOP_N}, got {}",
                self.top_n
            )))
        }
    }
}

//! Ranking settings (a singleton row) and the leaderboard query.

use chrono::{DateTime, Utc};
use gacha_core::{RankingMetric, RankingPeriod, RankingSettings};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RankingRow {
    pub rank: i64,
    pub user_id: i64,
    pub display_name: String,
    pub level: i32,
    pub score: i64,
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    is_enabled: bool,
    period: String,
    metric: String,
    top_n: i32,
}

/// # Errors
///
/// Returns [`DbError::Core`] if the stored row carries an unknown period or
/// metric, or [`DbError::Sqlx`] if the query fails.
pub async fn get_ranking_settings(pool: &PgPool) -> Result<RankingSettings, DbError> {
    let row = sqlx::query_as::<_, SettingsRow>(
        "SELECT is_enabled, period, metric, top_n FROM ranking_settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(RankingSettings::default());
    };

    Ok(RankingSettings {
        is_enabled: row.is_enabled,
        period: row.period.parse::<RankingPeriod>()?,
        metric: row.metric.parse::<RankingMetric>()?,
        top_n: row.top_n,
    })
}

/// Validates and stores the settings, creating the singleton row if absent.
///
/// # Errors
///
/// Returns [`DbError::Core`] if `top_n` is out of range, or
/// [`DbError::Sqlx`] if the upsert fails.
pub async fn update_ranking_settings(
    pool: &PgPool,
    settings: &RankingSettings,
) -> Result<RankingSettings, DbError> {
    settings.validate()?;

    sqlx::query(
        "INSERT INTO ranking_settings (id, is_enabled, period, metric, top_n, updated_at) \
         VALUES (1, $1, $2, $3, $4, NOW()) \
         ON CONFLICT (id) DO UPDATE SET \
             is_enabled = EXCLUDED.is_enabled, \
             period     = EXCLUDED.period, \
             metric     = EXCLUDED.metric, \
             top_n      = EXCLUDED.top_n, \
             updated_at = NOW()",
    )
    .bind(settings.is_enabled)
    .bind(settings.period.as_str())
    .bind(settings.metric.as_str())
    .bind(settings.top_n)
    .execute(pool)
    .await?;

    Ok(*settings)
}

/// Per-user score expression and source for each metric. Every variant
/// exposes `user_id`, `score` and `created_at`.
fn metric_source(metric: RankingMetric) -> &'static str {
    match metric {
        RankingMetric::Draws => {
            "SELECT user_id, 1::BIGINT AS score, created_at FROM gacha_results"
        }
        RankingMetric::PointsSpent => {
            "SELECT user_id, -(free_delta + paid_delta) AS score, created_at \
             FROM transactions WHERE kind = 'gacha'"
        }
        RankingMetric::SsrCount => {
            "SELECT user_id, 1::BIGINT AS score, created_at FROM gacha_results \
             WHERE rarity = 'SSR'"
        }
    }
}

/// Top-N users for the configured metric over the period window ending at
/// `now`. Ties share a rank; users with no activity in the window are omitted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ranking(
    pool: &PgPool,
    settings: &RankingSettings,
    now: DateTime<Utc>,
) -> Result<Vec<RankingRow>, DbError> {
    let since = settings.period.window_start(now);
    let source = metric_source(settings.metric);

    let rows = sqlx::query_as::<_, RankingRow>(&format!(
        "WITH activity AS ({source}), \
         scores AS ( \
             SELECT a.user_id, SUM(a.score)::BIGINT AS score \
             FROM activity a \
             WHERE ($1::TIMESTAMPTZ IS NULL OR a.created_at >= $1) \
               AND a.created_at <= $2 \
             GROUP BY a.user_id \
             HAVING SUM(a.score) > 0 \
         ) \
         SELECT RANK() OVER (ORDER BY s.score DESC) AS rank, \
                u.id AS user_id, u.display_name, u.level, s.score \
         FROM scores s \
         JOIN users u ON u.id = s.user_id \
         WHERE u.is_active \
         ORDER BY s.score DESC, u.id \
         LIMIT $3"
    ))
    .bind(since)
    .bind(now)
    .bind(i64::from(settings.top_n))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_metric_source_exposes_the_same_columns() {
        for metric in [
            RankingMetric::Draws,
            RankingMetric::PointsSpent,
            RankingMetric::SsrCount,
        ] {
            let sql = metric_source(metric);
            assert!(sql.contains("user_id"), "{sql}");
            assert!(sql.contains("AS score"), "{sql}");
            assert!(sql.contains("created_at"), "{sql}");
        }
    }

    #[test]
    fn points_spent_counts_only_draw_debits() {
        assert!(metric_source(RankingMetric::PointsSpent).contains("kind = 'gacha'"));
    }
}

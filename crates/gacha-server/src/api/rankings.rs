use axum::{
    extract::State,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use gacha_core::{RankingMetric, RankingPeriod, RankingSettings};
use serde::{Deserialize, Serialize};

use crate::api::extract::ApiJson;
use crate::middleware::RequestId;

use super::{map_db_error, validation_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct RankingEntry {
    rank: i64,
    user_id: i64,
    display_name: String,
    level: i32,
    score: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct RankingBoard {
    period: RankingPeriod,
    metric: RankingMetric,
    since: Option<DateTime<Utc>>,
    entries: Vec<RankingEntry>,
}

#[derive(Debug, Deserialize)]
pub(super) struct UpdateSettingsRequest {
    pub is_enabled: bool,
    pub period: String,
    pub metric: String,
    pub top_n: i32,
}

/// GET /api/v1/rankings: the leaderboard for the configured period/metric.
pub(super) async fn get_ranking(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<RankingBoard>>, ApiError> {
    let rid = &req_id.0;
    let settings = gacha_db::get_ranking_settings(&state.pool)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    if !settings.is_enabled {
        return Err(ApiError::new(rid, "not_found", "rankings are disabled"));
    }

    let now = Utc::now();
    let rows = gacha_db::list_ranking(&state.pool, &settings, now)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let data = RankingBoard {
        period: settings.period,
        metric: settings.metric,
        since: settings.period.window_start(now),
        entries: rows
            .into_iter()
            .map(|row| RankingEntry {
                rank: row.rank,
                user_id: row.user_id,
                display_name: row.display_name,
                level: row.level,
                score: row.score,
            })
            .collect(),
    };

    Ok(Json(ApiResponse::new(data, req_id.0)))
}

pub(super) async fn get_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<RankingSettings>>, ApiError> {
    let settings = gacha_db::get_ranking_settings(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse::new(settings, req_id.0)))
}

pub(super) async fn update_settings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<UpdateSettingsRequest>,
) -> Result<Json<ApiResponse<RankingSettings>>, ApiError> {
    let rid = &req_id.0;
    let settings = RankingSettings {
        is_enabled: body.is_enabled,
        period: body
            .period
            .parse()
            .map_err(|e: gacha_core::CoreError| validation_error(rid, e.to_string()))?,
        metric: body
            .metric
            .parse()
            .map_err(|e: gacha_core::CoreError| validation_error(rid, e.to_string()))?,
        top_n: body.top_n,
    };

    let saved = gacha_db::update_ranking_settings(&state.pool, &settings)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    Ok(Json(ApiResponse::new(saved, req_id.0)))
}

//! Admin user handlers: account creation and point grants.

use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use gacha_core::PointBalance;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::api::extract::{ApiJson, ApiPath};
use crate::middleware::RequestId;

use super::{map_db_error, required_text, validation_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct CreateUserRequest {
    pub display_name: String,
    #[serde(default)]
    pub free_points: i64,
    #[serde(default)]
    pub paid_points: i64,
}

#[derive(Debug, Deserialize)]
pub(super) struct GrantPointsRequest {
    #[serde(default)]
    pub free: i64,
    #[serde(default)]
    pub paid: i64,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct CreatedUser {
    id: i64,
    display_name: String,
    /// Shown exactly once; only its salted hash is stored.
    token: String,
    free_points: i64,
    paid_points: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct BalanceItem {
    user_id: i64,
    free_points: i64,
    paid_points: i64,
    total_points: i64,
}

/// POST /api/v1/admin/users: create a player and return their bearer token.
pub(super) async fn create_user(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedUser>>), ApiError> {
    let rid = &req_id.0;
    let display_name = required_text(rid, "display_name", &body.display_name, 50)?;
    if body.free_points < 0 || body.paid_points < 0 {
        return Err(validation_error(rid, "initial points must not be negative"));
    }

    let token = gacha_core::generate_token(&mut StdRng::from_os_rng());
    let token_hash = gacha_core::hash_token(&state.config.token_hash_salt, &token);

    let row = gacha_db::create_user(
        &state.pool,
        &display_name,
        &token_hash,
        PointBalance::new(body.free_points, body.paid_points),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(user_id = row.id, "user created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            CreatedUser {
                id: row.id,
                display_name: row.display_name,
                token,
                free_points: row.free_points,
                paid_points: row.paid_points,
            },
            req_id.0,
        )),
    ))
}

/// POST /api/v1/admin/users/:id/points: credit free and/or paid points.
pub(super) async fn grant_points(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    ApiPath(user_id): ApiPath<i64>,
    ApiJson(body): ApiJson<GrantPointsRequest>,
) -> Result<Json<ApiResponse<BalanceItem>>, ApiError> {
    let rid = &req_id.0;
    if body.free < 0 || body.paid < 0 {
        return Err(validation_error(rid, "grant amounts must not be negative"));
    }
    if body.free == 0 && body.paid == 0 {
        return Err(validation_error(rid, "grant at least one point"));
    }

    let row = gacha_db::grant_points(
        &state.pool,
        user_id,
        body.free,
        body.paid,
        body.note.as_deref(),
    )
    .await
    .map_err(|e| map_db_error(rid.clone(), &e))?;

    tracing::info!(user_id, free = body.free, paid = body.paid, "points granted");

    Ok(Json(ApiResponse::new(
        BalanceItem {
            user_id: row.id,
            free_points: row.free_points,
            paid_points: row.paid_points,
            total_points: row.balance().total(),
        },
        req_id.0,
    )))
}

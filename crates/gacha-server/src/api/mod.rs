mod announcements;
mod catalog;
mod extract;
mod gacha;
mod me;
mod notifications;
mod rankings;
mod shipments;
mod users;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_admin, require_user, AuthState, RateLimitState,
    RequestId, UserAuthState,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<gacha_core::AppConfig>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" | "insufficient_points" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

/// Translates a [`gacha_db::DbError`] into the API error envelope.
///
/// Domain failures keep their message; anything unexpected is logged and
/// reported as a generic `internal_error`.
pub(super) fn map_db_error(request_id: String, error: &gacha_db::DbError) -> ApiError {
    use gacha_db::DbError;

    match error {
        DbError::NotFound => ApiError::new(request_id, "not_found", "resource not found"),
        DbError::InsufficientPoints { .. } => {
            ApiError::new(request_id, "insufficient_points", error.to_string())
        }
        DbError::InsufficientCards { .. } | DbError::EmptyPool(_) => {
            ApiError::new(request_id, "bad_request", error.to_string())
        }
        DbError::DuplicateRequest(_) | DbError::NotEditable { .. } => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        DbError::Core(core) => ApiError::new(request_id, "validation_error", core.to_string()),
        DbError::Sqlx(sqlx::Error::Database(db_err))
            if db_err.code().as_deref() == Some("23505") =>
        {
            ApiError::new(request_id, "conflict", "a record with that key already exists")
        }
        DbError::Sqlx(sqlx::Error::Database(db_err))
            if db_err.code().as_deref() == Some("23503") =>
        {
            ApiError::new(request_id, "not_found", "referenced record does not exist")
        }
        _ => {
            tracing::error!(error = %error, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

/// Lets a present-but-null JSON field deserialize as `Some(None)`, so PATCH
/// bodies can tell "clear this" apart from "leave it alone".
#[allow(clippy::option_option)]
pub(super) fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// Shorthand for a `validation_error` response.
pub(super) fn validation_error(request_id: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(request_id, "validation_error", message)
}

/// Trims `value` and checks it holds between 1 and `max` characters.
pub(super) fn required_text(
    request_id: &str,
    field: &str,
    value: &str,
    max: usize,
) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > max {
        return Err(validation_error(
            request_id,
            format!("{field} must be 1-{max} characters"),
        ));
    }
    Ok(trimmed.to_owned())
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("idempotency-key"),
        ])
}

fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/gacha/products", get(gacha::list_products))
        .route("/api/v1/gacha/products/{product_id}", get(gacha::get_product))
        .route(
            "/api/v1/announcements",
            get(announcements::list_published),
        )
        .route("/api/v1/rankings", get(rankings::get_ranking))
}

fn user_router(user_auth: UserAuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/gacha/execute", post(gacha::execute_gacha))
        .route("/api/v1/me", get(me::get_me))
        .route("/api/v1/me/cards", get(me::list_my_cards))
        .route("/api/v1/me/history", get(me::list_my_history))
        .route("/api/v1/me/transactions", get(me::list_my_transactions))
        .route("/api/v1/me/notifications", get(me::list_my_notifications))
        .route("/api/v1/me/shipments", get(shipments::list_my_shipments))
        .route(
            "/api/v1/me/shipments/{shipment_id}",
            get(shipments::get_my_shipment),
        )
        .route("/api/v1/shipments", post(shipments::request_shipment))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(user_auth, require_user))
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                )),
        )
}

fn admin_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/admin/cards",
            get(catalog::list_cards).post(catalog::create_card),
        )
        .route(
            "/api/v1/admin/cards/{card_id}",
            get(catalog::get_card)
                .patch(catalog::update_card)
                .delete(catalog::deactivate_card),
        )
        .route("/api/v1/admin/products", post(catalog::create_product))
        .route(
            "/api/v1/admin/products/{product_id}",
            get(catalog::get_product),
        )
        .route(
            "/api/v1/admin/products/{product_id}/pool",
            put(catalog::upsert_pool_card),
        )
        .route(
            "/api/v1/admin/products/{product_id}/pool/{card_id}",
            delete(catalog::remove_pool_card),
        )
        .route(
            "/api/v1/admin/announcements",
            get(announcements::list_all).post(announcements::create),
        )
        .route(
            "/api/v1/admin/announcements/{announcement_id}",
            patch(announcements::update).delete(announcements::remove),
        )
        .route(
            "/api/v1/admin/notifications",
            get(notifications::list).post(notifications::create),
        )
        .route(
            "/api/v1/admin/notifications/{notification_id}",
            patch(notifications::update),
        )
        .route(
            "/api/v1/admin/notifications/{notification_id}/cancel",
            post(notifications::cancel),
        )
        .route(
            "/api/v1/admin/rankings/settings",
            get(rankings::get_settings).put(rankings::update_settings),
        )
        .route("/api/v1/admin/shipments", get(shipments::list_shipments))
        .route(
            "/api/v1/admin/shipments/{shipment_id}/status",
            put(shipments::update_status),
        )
        .route(
            "/api/v1/admin/users",
            post(users::create_user),
        )
        .route(
            "/api/v1/admin/users/{user_id}/points",
            post(users::grant_points),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(auth, require_admin))
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                )),
        )
}

/// Builds the full router. Player and admin routes get independent copies
/// of `rate_limit`, each applied after authentication.
pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let user_auth = UserAuthState {
        pool: state.pool.clone(),
        token_hash_salt: Arc::from(state.config.token_hash_salt.as_str()),
    };

    Router::new()
        .merge(public_router())
        .merge(user_router(user_auth, rate_limit.detached()))
        .merge(admin_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match gacha_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The authenticated player, stored as a request extension by
/// [`require_user`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub gacha_db::UserRow);

/// Index of the admin key that authenticated the request, stored as a
/// request extension by [`require_admin`].
#[derive(Debug, Clone, Copy)]
pub struct AdminKey(pub usize);

/// Admin API key settings used by [`require_admin`].
#[derive(Debug, Clone)]
pub struct AuthState {
    api_keys: Arc<Vec<String>>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds admin auth from `GACHA_ADMIN_API_KEYS` (comma-separated bearer tokens).
    ///
    /// In development, empty/missing keys disable admin auth for local iteration.
    /// In non-development envs, empty/missing keys fail startup.
    pub fn from_env(is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("GACHA_ADMIN_API_KEYS").unwrap_or_default();
        Self::from_keys(&raw, is_development)
    }

    /// Parses a comma-separated key list.
    pub fn from_keys(raw: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut keys: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        keys.sort();
        keys.dedup();

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "GACHA_ADMIN_API_KEYS not set; admin auth disabled in development environment"
                );
                return Ok(Self {
                    api_keys: Arc::new(Vec::new()),
                    enabled: false,
                });
            }

            anyhow::bail!(
                "GACHA_ADMIN_API_KEYS is required outside development; provide comma-separated bearer tokens"
            );
        }

        Ok(Self {
            api_keys: Arc::new(keys),
            enabled: true,
        })
    }

    /// Returns the index of the configured key equal to `token`.
    ///
    /// Every key is compared in constant time.
    fn match_key(&self, token: &str) -> Option<usize> {
        let mut matched = None;
        for (index, key) in self.api_keys.iter().enumerate() {
            if bool::from(key.as_bytes().ct_eq(token.as_bytes())) {
                matched = Some(index);
            }
        }
        matched
    }
}

/// Player token resolution settings used by [`require_user`].
#[derive(Clone)]
pub struct UserAuthState {
    pub pool: PgPool,
    pub token_hash_salt: Arc<str>,
}

/// Windows tracked before expired ones are swept.
const RATE_LIMIT_SWEEP_THRESHOLD: usize = 1_024;

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter keyed per principal: the player id, the admin key,
/// or the client address when neither is known.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, RateLimitWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn from_config(config: &gacha_core::AppConfig) -> Self {
        Self::new(
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        )
    }

    /// Same limits, independent counters.
    #[must_use]
    pub fn detached(&self) -> Self {
        Self::new(self.max_requests, self.window)
    }

    /// Counts one request for `key`; returns `false` once the window is spent.
    async fn try_acquire(&self, key: String) -> bool {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();

        if windows.len() >= RATE_LIMIT_SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started_at) < self.window);
        }

        let window = windows.entry(key).or_insert(RateLimitWindow {
            started_at: now,
            count: 0,
        });
        if now.duration_since(window.started_at) >= self.window {
            window.started_at = now;
            window.count = 0;
        }
        if window.count >= self.max_requests {
            return false;
        }
        window.count += 1;
        true
    }
}

fn middleware_error(req: &Request, code: &'static str, message: &'static str) -> Response {
    let req_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    crate::api::ApiError::new(req_id, code, message).into_response()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware enforcing admin Bearer key auth when enabled.
pub async fn require_admin(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        return next.run(req).await;
    }

    let matched = extract_bearer_token(req.headers().get(AUTHORIZATION))
        .and_then(|token| auth.match_key(token));

    match matched {
        Some(index) => {
            req.extensions_mut().insert(AdminKey(index));
            next.run(req).await
        }
        None => middleware_error(&req, "unauthorized", "missing or invalid admin key"),
    }
}

/// Middleware resolving a player Bearer token to an active user.
///
/// The token is hashed with the configured salt and looked up; on success
/// the user is inserted as a [`CurrentUser`] extension.
pub async fn require_user(
    State(auth): State<UserAuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_bearer_token(req.headers().get(AUTHORIZATION)) else {
        return middleware_error(&req, "unauthorized", "missing or invalid bearer token");
    };

    let token_hash = gacha_core::hash_token(&auth.token_hash_salt, token);
    match gacha_db::get_user_by_token_hash(&auth.pool, &token_hash).await {
        Ok(Some(user)) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Ok(None) => middleware_error(&req, "unauthorized", "missing or invalid bearer token"),
        Err(e) => {
            tracing::error!(error = %e, "user token lookup failed");
            middleware_error(&req, "internal_error", "authentication unavailable")
        }
    }
}

/// Rate-limit key for a request that already passed the auth layers.
fn rate_limit_key(req: &Request) -> String {
    let extensions = req.extensions();
    if let Some(CurrentUser(user)) = extensions.get::<CurrentUser>() {
        return format!("user:{}", user.id);
    }
    if let Some(AdminKey(index)) = extensions.get::<AdminKey>() {
        return format!("admin:{index}");
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "anonymous".to_string(), |info| format!("ip:{}", info.0.ip()))
}

/// Middleware enforcing a fixed request-per-window limit per principal.
///
/// Must sit inside the auth layer so rejected requests never spend budget.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let key = rate_limit_key(&req);
    if !rate_limit.try_acquire(key).await {
        return middleware_error(&req, "rate_limited", "rate limit exceeded");
    }

    next.run(req).await
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

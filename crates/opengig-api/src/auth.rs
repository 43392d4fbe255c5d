use axum::extract::{Request, State};
use axum::http::{header, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::telemetry::AUTH_FAILURES;
use crate::AppState;

pub const ROLE_CLIENT: &str = "client";
pub const ROLE_FREELANCER: &str = "freelancer";
pub const ROLE_ADMIN: &str = "admin";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Wallet address, lowercase.
    pub sub: String,
    pub uid: Uuid,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller, inserted as a request extension by `auth_layer`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub wallet: String,
    pub role: String,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

fn jwt_secret() -> Vec<u8> {
    std::env::var("OPENGIG_JWT_SECRET")
        .unwrap_or_else(|_| "opengig-dev-secret".into())
        .into_bytes()
}

fn token_ttl_secs() -> i64 {
    std::env::var("OPENGIG_JWT_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(86_400)
}

pub fn issue_token(user: &User) -> ApiResult<String> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.wallet_address.clone(),
        uid: user.id,
        role: user.role.clone(),
        iat: now,
        exp: now + token_ttl_secs(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(&jwt_secret()))
        .map_err(|e| ApiError::internal(format!("token encode: {e}")))
}

pub fn decode_token(token: &str) -> ApiResult<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(&jwt_secret()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| ApiError::unauthorized("invalid or expired token"))
}

fn extract_bearer(req: &Request) -> Option<String> {
    let header = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() == 2 && parts[0].eq_ignore_ascii_case("Bearer") {
        Some(parts[1].trim().to_string())
    } else {
        None
    }
}

fn is_public(method: &Method, path: &str) -> bool {
    matches!(path, "/health" | "/readyz" | "/startupz" | "/metrics" | "/openapi.json" | "/swagger")
        || path.starts_with("/api/auth/")
        // Public profile lookups by wallet address.
        || (*method == Method::GET && path.starts_with("/api/users/0x"))
}

pub async fn auth_layer(State(_state): State<AppState>, mut req: Request, next: Next) -> Result<Response, Response> {
    let path = req.uri().path().to_string();
    if is_public(req.method(), &path) {
        return Ok(next.run(req).await);
    }
    let Some(token) = extract_bearer(&req) else {
        AUTH_FAILURES.inc();
        tracing::debug!(%path, "auth_missing_bearer");
        return Err(ApiError::unauthorized("missing bearer token").into_response());
    };
    let claims = match decode_token(&token) {
        Ok(c) => c,
        Err(e) => {
            AUTH_FAILURES.inc();
            tracing::debug!(%path, "auth_invalid_token");
            return Err(e.into_response());
        }
    };
    req.extensions_mut().insert(Identity {
        user_id: claims.uid,
        wallet: claims.sub,
        role: claims.role,
    });
    Ok(next.run(req).await)
}

pub fn require_admin(identity: &Identity) -> Result<(), ApiError> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("admin required"))
    }
}

/// Wallets listed in OPENGIG_ADMIN_WALLETS get the admin role on first login.
pub fn bootstrap_role(wallet: &str) -> &'static str {
    if let Ok(list) = std::env::var("OPENGIG_ADMIN_WALLETS") {
        if list.split(',').any(|w| w.trim().eq_ignore_ascii_case(wallet)) {
            return ROLE_ADMIN;
        }
    }
    ROLE_CLIENT
}

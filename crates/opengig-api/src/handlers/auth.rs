use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{bootstrap_role, issue_token};
use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::telemetry::AUTH_FAILURES;
use crate::wallet::{fresh_nonce, login_message, normalize_wallet, recover_wallet};
use crate::AppState;

const USER_COLS: &str = "id, wallet_address, role, username, email, bio, skills, avatar_url, created_at, updated_at";

fn nonce_ttl_secs() -> i64 {
    std::env::var("OPENGIG_NONCE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300)
}

#[derive(Deserialize, ToSchema)]
pub struct NonceRequest { pub wallet_address: String }

#[derive(Serialize, ToSchema)]
pub struct NonceResponse { pub nonce: String, pub message: String }

/// Issue a login nonce for a wallet. The wallet signs `message` verbatim.
#[utoipa::path(post, path = "/api/auth/nonce", request_body = NonceRequest,
    responses((status = 200, body = NonceResponse), (status = 400, body = crate::error::ApiErrorBody)))]
pub async fn nonce(State(state): State<AppState>, Json(req): Json<NonceRequest>) -> ApiResult<Json<NonceResponse>> {
    let wallet = normalize_wallet(&req.wallet_address)
        .ok_or_else(|| ApiError::bad_request("wallet_address must be a 0x-prefixed 20-byte hex address"))?;
    let nonce = fresh_nonce();
    sqlx::query(
        "INSERT INTO auth_nonces (wallet_address, nonce) VALUES ($1,$2)
         ON CONFLICT (wallet_address) DO UPDATE SET nonce = EXCLUDED.nonce, created_at = now()",
    )
    .bind(&wallet)
    .bind(&nonce)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::internal(format!("nonce upsert: {e}")))?;
    let message = login_message(&wallet, &nonce);
    Ok(Json(NonceResponse { nonce, message }))
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyRequest { pub wallet_address: String, pub signature: String }

#[derive(Serialize, ToSchema)]
pub struct AuthResponse { pub token: String, pub user: User }

/// Verify a signed nonce and mint a session token. Nonces are single use.
#[utoipa::path(post, path = "/api/auth/verify", request_body = VerifyRequest,
    responses((status = 200, body = AuthResponse), (status = 401, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state, req), fields(wallet = %req.wallet_address))]
pub async fn verify(State(state): State<AppState>, Json(req): Json<VerifyRequest>) -> ApiResult<Json<AuthResponse>> {
    let wallet = normalize_wallet(&req.wallet_address)
        .ok_or_else(|| ApiError::bad_request("wallet_address must be a 0x-prefixed 20-byte hex address"))?;
    let row = sqlx::query_as::<_, (String, chrono::DateTime<chrono::Utc>)>(
        "SELECT nonce, created_at FROM auth_nonces WHERE wallet_address=$1",
    )
    .bind(&wallet)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| ApiError::internal(format!("nonce lookup: {e}")))?;
    let Some((nonce, created_at)) = row else {
        AUTH_FAILURES.inc();
        return Err(ApiError::unauthorized("no nonce issued for this wallet"));
    };
    if (chrono::Utc::now() - created_at).num_seconds() > nonce_ttl_secs() {
        let _ = sqlx::query("DELETE FROM auth_nonces WHERE wallet_address=$1")
            .bind(&wallet)
            .execute(&state.db)
            .await;
        AUTH_FAILURES.inc();
        return Err(ApiError::unauthorized("nonce expired, request a new one"));
    }
    let message = login_message(&wallet, &nonce);
    let recovered = recover_wallet(&message, &req.signature)?;
    if recovered != wallet {
        AUTH_FAILURES.inc();
        tracing::info!(%recovered, "signature recovered a different wallet");
        return Err(ApiError::unauthorized("signature does not match wallet"));
    }
    // Single use: burn the nonce before minting the token.
    let _ = sqlx::query("DELETE FROM auth_nonces WHERE wallet_address=$1")
        .bind(&wallet)
        .execute(&state.db)
        .await;
    let user = match sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE wallet_address=$1"))
        .bind(&wallet)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::internal(format!("user lookup: {e}")))?
    {
        Some(u) => u,
        None => sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (wallet_address, role) VALUES ($1,$2) RETURNING {USER_COLS}"
        ))
        .bind(&wallet)
        .bind(bootstrap_role(&wallet))
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::internal(format!("user insert: {e}")))?,
    };
    let token = issue_token(&user)?;
    tracing::info!(user_id=%user.id, role=%user.role, "wallet login");
    Ok(Json(AuthResponse { token, user }))
}

/// Delete expired nonces. Called from the GC loop spawned at router build.
pub async fn run_nonce_gc(db: &sqlx::Pool<sqlx::Postgres>, ttl_secs: i64) -> anyhow::Result<u64> {
    let cutoff = chrono::Utc::now() - chrono::Duration::seconds(ttl_secs.max(0));
    let deleted = sqlx::query("DELETE FROM auth_nonces WHERE created_at < $1")
        .bind(cutoff)
        .execute(db)
        .await?
        .rows_affected();
    Ok(deleted)
}

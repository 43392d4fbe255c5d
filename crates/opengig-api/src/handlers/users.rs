use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{Identity, ROLE_CLIENT, ROLE_FREELANCER};
use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::wallet::normalize_wallet;
use crate::AppState;

const USER_COLS: &str = "id, wallet_address, role, username, email, bio, skills, avatar_url, created_at, updated_at";

pub async fn me(State(state): State<AppState>, Extension(ident): Extension<Identity>) -> ApiResult<Json<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id=$1"))
        .bind(ident.user_id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "user"))?;
    Ok(Json(user))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub skills: Option<Vec<String>>,
    pub avatar_url: Option<String>,
    /// Switch between client and freelancer. Admin cannot be self-assigned.
    pub role: Option<String>,
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    if let Some(role) = &req.role {
        if role != ROLE_CLIENT && role != ROLE_FREELANCER {
            return Err(ApiError::bad_request("role must be client or freelancer"));
        }
    }
    let user = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET
            username = COALESCE($2, username),
            email = COALESCE($3, email),
            bio = COALESCE($4, bio),
            skills = COALESCE($5, skills),
            avatar_url = COALESCE($6, avatar_url),
            role = COALESCE($7, role),
            updated_at = now()
         WHERE id=$1 RETURNING {USER_COLS}"
    ))
    .bind(ident.user_id)
    .bind(req.username)
    .bind(req.email)
    .bind(req.bio)
    .bind(req.skills)
    .bind(req.avatar_url)
    .bind(req.role)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "user"))?;
    Ok(Json(user))
}

/// Public profile by wallet address.
pub async fn by_wallet(State(state): State<AppState>, Path(wallet): Path<String>) -> ApiResult<Json<User>> {
    let wallet = normalize_wallet(&wallet).ok_or_else(|| ApiError::bad_request("invalid wallet address"))?;
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE wallet_address=$1"))
        .bind(&wallet)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "user"))?;
    Ok(Json(user))
}

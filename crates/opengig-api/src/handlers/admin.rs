use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_admin, Identity, ROLE_ADMIN, ROLE_CLIENT, ROLE_FREELANCER};
use crate::error::{ApiError, ApiResult};
use crate::models::{Dispute, User};
use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct StatusCount { pub status: String, pub count: i64 }

#[derive(Serialize, ToSchema)]
pub struct AdminStats {
    pub users: i64,
    pub jobs: i64,
    pub applications: i64,
    pub open_disputes: i64,
    pub transactions: i64,
    pub jobs_by_status: Vec<StatusCount>,
}

/// Marketplace counters for the admin dashboard.
pub async fn stats(State(state): State<AppState>, Extension(ident): Extension<Identity>) -> ApiResult<Json<AdminStats>> {
    require_admin(&ident)?;
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db).await.map_err(|e| ApiError::from_db(e, "users"))?;
    let jobs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
        .fetch_one(&state.db).await.map_err(|e| ApiError::from_db(e, "jobs"))?;
    let applications: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applications")
        .fetch_one(&state.db).await.map_err(|e| ApiError::from_db(e, "applications"))?;
    let open_disputes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM disputes WHERE status IN ('open','under_review')")
        .fetch_one(&state.db).await.map_err(|e| ApiError::from_db(e, "disputes"))?;
    let transactions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(&state.db).await.map_err(|e| ApiError::from_db(e, "transactions"))?;
    let jobs_by_status: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")
            .fetch_all(&state.db).await.map_err(|e| ApiError::from_db(e, "jobs"))?;
    Ok(Json(AdminStats {
        users,
        jobs,
        applications,
        open_disputes,
        transactions,
        jobs_by_status: jobs_by_status.into_iter().map(|(status, count)| StatusCount { status, count }).collect(),
    }))
}

#[derive(Deserialize, ToSchema)]
pub struct PageQuery { pub limit: Option<i64>, pub offset: Option<i64> }

pub async fn list_users(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Query(q): Query<PageQuery>,
) -> ApiResult<Json<Vec<User>>> {
    require_admin(&ident)?;
    let limit = q.limit.unwrap_or(100).clamp(1, 1000);
    let offset = q.offset.unwrap_or(0).max(0);
    let rows = sqlx::query_as::<_, User>(
        "SELECT id, wallet_address, role, username, email, bio, skills, avatar_url, created_at, updated_at
         FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "users"))?;
    Ok(Json(rows))
}

#[derive(Deserialize, ToSchema)]
pub struct SetRoleRequest { pub role: String }

/// Promote or demote a user.
#[tracing::instrument(level = "info", skip(state, req), fields(target = %id, admin = %ident.wallet))]
pub async fn set_role(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> ApiResult<Json<User>> {
    require_admin(&ident)?;
    if ![ROLE_CLIENT, ROLE_FREELANCER, ROLE_ADMIN].contains(&req.role.as_str()) {
        return Err(ApiError::bad_request("unknown role"));
    }
    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET role=$2, updated_at=now() WHERE id=$1
         RETURNING id, wallet_address, role, username, email, bio, skills, avatar_url, created_at, updated_at",
    )
    .bind(id)
    .bind(&req.role)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "user"))?;
    tracing::info!(role=%req.role, "role changed");
    Ok(Json(user))
}

#[derive(Deserialize, ToSchema)]
pub struct DisputeQueueQuery { pub status: Option<String>, pub limit: Option<i64>, pub offset: Option<i64> }

/// Dispute queue, oldest first so the backlog drains in order.
pub async fn dispute_queue(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Query(q): Query<DisputeQueueQuery>,
) -> ApiResult<Json<Vec<Dispute>>> {
    require_admin(&ident)?;
    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let offset = q.offset.unwrap_or(0).max(0);
    let status = q.status.unwrap_or_else(|| "open".into());
    let rows = sqlx::query_as::<_, Dispute>(
        "SELECT id, job_id, raised_by, client_id, freelancer_id, reason, status, resolution_notes, resolved_by, resolved_at, resolution_tx_hash, created_at
         FROM disputes WHERE status=$1 ORDER BY created_at LIMIT $2 OFFSET $3",
    )
    .bind(&status)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "disputes"))?;
    Ok(Json(rows))
}

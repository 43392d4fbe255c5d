use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::Milestone;
use crate::services::{jobs, notify};
use crate::AppState;

const MS_COLS: &str = "id, job_id, position, title, amount, completed, paid, payment_tx_hash, created_at";

pub async fn for_job(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Milestone>>> {
    let job = jobs::fetch(&state.db, job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if !jobs::is_party(&job, ident.user_id) && !ident.is_admin() {
        return Err(ApiError::forbidden("not a party to this job"));
    }
    let rows = jobs::milestones(&state.db, job_id).await.map_err(|e| ApiError::from_db(e, "milestones"))?;
    Ok(Json(rows))
}

async fn fetch_milestone(state: &AppState, id: Uuid) -> ApiResult<Milestone> {
    sqlx::query_as::<_, Milestone>(&format!("SELECT {MS_COLS} FROM milestones WHERE id=$1"))
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "milestone"))
}

/// Freelancer marks a milestone's work as done.
#[utoipa::path(post, path = "/api/milestones/{id}/complete",
    responses((status = 200, body = Milestone), (status = 409, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state), fields(milestone_id = %id))]
pub async fn complete(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Milestone>> {
    let ms = fetch_milestone(&state, id).await?;
    let job = jobs::fetch(&state.db, ms.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.freelancer_id != Some(ident.user_id) {
        return Err(ApiError::forbidden("only the assigned freelancer can complete"));
    }
    if !matches!(job.status.as_str(), "assigned" | "in_progress") {
        return Err(ApiError::conflict("job is not in a workable state"));
    }
    if ms.completed {
        return Err(ApiError::conflict("milestone already completed"));
    }
    let ms = sqlx::query_as::<_, Milestone>(&format!(
        "UPDATE milestones SET completed=TRUE WHERE id=$1 RETURNING {MS_COLS}"
    ))
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "milestone"))?;
    if job.status == "assigned" {
        jobs::set_status(&state.db, job.id, "in_progress").await.map_err(|e| ApiError::from_db(e, "job"))?;
    }
    notify::push(&state.db, job.client_id, "milestone_completed", "A milestone was marked complete", Some(job.id)).await;
    Ok(Json(ms))
}

#[derive(Deserialize, ToSchema)]
pub struct PayMilestoneRequest { pub tx_hash: String }

/// Client reports the on-chain `payMilestone` call. When the last milestone
/// is paid the job completes and the escrow is considered released.
#[utoipa::path(post, path = "/api/milestones/{id}/pay", request_body = PayMilestoneRequest,
    responses((status = 200, body = Milestone), (status = 409, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state, req), fields(milestone_id = %id))]
pub async fn pay(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<PayMilestoneRequest>,
) -> ApiResult<Json<Milestone>> {
    if req.tx_hash.trim().is_empty() {
        return Err(ApiError::bad_request("tx_hash required"));
    }
    let ms = fetch_milestone(&state, id).await?;
    let job = jobs::fetch(&state.db, ms.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id != ident.user_id {
        return Err(ApiError::forbidden("only the job client can pay"));
    }
    if !ms.completed {
        return Err(ApiError::conflict("milestone is not completed yet"));
    }
    if ms.paid {
        return Err(ApiError::conflict("milestone already paid"));
    }
    let ms = sqlx::query_as::<_, Milestone>(&format!(
        "UPDATE milestones SET paid=TRUE, payment_tx_hash=$2 WHERE id=$1 RETURNING {MS_COLS}"
    ))
    .bind(id)
    .bind(req.tx_hash.trim())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "milestone"))?;
    let _ = sqlx::query(
        "INSERT INTO transactions (job_id, user_id, tx_hash, tx_type, status, amount)
         VALUES ($1,$2,$3,'pay_milestone','confirmed',$4) ON CONFLICT (tx_hash) DO NOTHING",
    )
    .bind(job.id)
    .bind(ident.user_id)
    .bind(req.tx_hash.trim())
    .bind(ms.amount)
    .execute(&state.db)
    .await;
    let unpaid: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM milestones WHERE job_id=$1 AND NOT paid")
        .bind(job.id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "milestones"))?;
    if unpaid == 0 {
        jobs::set_status(&state.db, job.id, "completed").await.map_err(|e| ApiError::from_db(e, "job"))?;
        jobs::set_escrow_status(&state.db, job.id, "released").await.map_err(|e| ApiError::from_db(e, "job"))?;
        tracing::info!(job_id=%job.id, "all milestones paid, job completed");
    }
    if let Some(freelancer) = job.freelancer_id {
        notify::push(&state.db, freelancer, "milestone_paid", "A milestone payment was released", Some(job.id)).await;
    }
    Ok(Json(ms))
}

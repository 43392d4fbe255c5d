use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::{Job, Milestone};
use crate::services::{jobs, notify};
use crate::AppState;

const JOB_COLS: &str = "id, client_id, freelancer_id, title, description, category, budget, status, escrow_status, contract_job_id, deadline, created_at, updated_at";

#[derive(Deserialize, ToSchema)]
pub struct MilestoneInput { pub title: String, pub amount: i64 }

#[derive(Deserialize, ToSchema)]
pub struct CreateJobRequest {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub milestones: Vec<MilestoneInput>,
}

#[derive(Serialize, ToSchema)]
pub struct JobWithMilestones {
    #[serde(flatten)]
    pub job: Job,
    pub milestones: Vec<Milestone>,
}

/// Create a job with its milestone schedule. Budget is the milestone sum.
#[utoipa::path(post, path = "/api/jobs", request_body = CreateJobRequest,
    responses((status = 201, body = JobWithMilestones), (status = 400, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state, req), fields(client = %ident.wallet))]
pub async fn create_job(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Json(req): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobWithMilestones>)> {
    if req.title.trim().is_empty() {
        return Err(ApiError::bad_request("title required"));
    }
    if req.milestones.is_empty() {
        return Err(ApiError::bad_request("at least one milestone required"));
    }
    if req.milestones.iter().any(|m| m.amount <= 0 || m.title.trim().is_empty()) {
        return Err(ApiError::bad_request("milestones need a title and a positive amount"));
    }
    let budget: i64 = req.milestones.iter().map(|m| m.amount).sum();
    let job = sqlx::query_as::<_, Job>(&format!(
        "INSERT INTO jobs (client_id, title, description, category, budget, deadline)
         VALUES ($1,$2,$3,$4,$5,$6) RETURNING {JOB_COLS}"
    ))
    .bind(ident.user_id)
    .bind(req.title.trim())
    .bind(&req.description)
    .bind(req.category.as_deref().unwrap_or("general"))
    .bind(budget)
    .bind(req.deadline)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "job"))?;
    for (i, m) in req.milestones.iter().enumerate() {
        sqlx::query("INSERT INTO milestones (job_id, position, title, amount) VALUES ($1,$2,$3,$4)")
            .bind(job.id)
            .bind(i as i32)
            .bind(m.title.trim())
            .bind(m.amount)
            .execute(&state.db)
            .await
            .map_err(|e| ApiError::from_db(e, "milestone"))?;
    }
    let milestones = jobs::milestones(&state.db, job.id).await.map_err(|e| ApiError::from_db(e, "milestones"))?;
    tracing::info!(job_id=%job.id, budget, "job created");
    Ok((StatusCode::CREATED, Json(JobWithMilestones { job, milestones })))
}

#[derive(Deserialize, ToSchema)]
pub struct JobQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub client_id: Option<Uuid>,
    pub freelancer_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List jobs, newest first, with optional filters.
#[utoipa::path(get, path = "/api/jobs", responses((status = 200, body = [Job])))]
pub async fn list_jobs(State(state): State<AppState>, Query(q): Query<JobQuery>) -> ApiResult<Json<Vec<Job>>> {
    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let offset = q.offset.unwrap_or(0).max(0);
    let rows = sqlx::query_as::<_, Job>(&format!(
        "SELECT {JOB_COLS} FROM jobs
         WHERE ($1::text IS NULL OR status = $1)
           AND ($2::text IS NULL OR category = $2)
           AND ($3::uuid IS NULL OR client_id = $3)
           AND ($4::uuid IS NULL OR freelancer_id = $4)
         ORDER BY created_at DESC LIMIT $5 OFFSET $6"
    ))
    .bind(q.status)
    .bind(q.category)
    .bind(q.client_id)
    .bind(q.freelancer_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "jobs"))?;
    Ok(Json(rows))
}

#[utoipa::path(get, path = "/api/jobs/{id}", responses((status = 200, body = JobWithMilestones), (status = 404, body = crate::error::ApiErrorBody)))]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<JobWithMilestones>> {
    let job = jobs::fetch(&state.db, id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    let milestones = jobs::milestones(&state.db, id).await.map_err(|e| ApiError::from_db(e, "milestones"))?;
    Ok(Json(JobWithMilestones { job, milestones }))
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Edit a job while it is still open.
pub async fn update_job(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateJobRequest>,
) -> ApiResult<Json<Job>> {
    let job = jobs::fetch(&state.db, id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id != ident.user_id {
        return Err(ApiError::forbidden("only the job client can edit"));
    }
    if job.status != "open" {
        return Err(ApiError::conflict("job can only be edited while open"));
    }
    let job = sqlx::query_as::<_, Job>(&format!(
        "UPDATE jobs SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            deadline = COALESCE($5, deadline),
            updated_at = now()
         WHERE id=$1 RETURNING {JOB_COLS}"
    ))
    .bind(id)
    .bind(req.title)
    .bind(req.description)
    .bind(req.category)
    .bind(req.deadline)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "job"))?;
    Ok(Json(job))
}

/// Cancel an open, unfunded job.
pub async fn cancel_job(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    let job = jobs::fetch(&state.db, id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id != ident.user_id {
        return Err(ApiError::forbidden("only the job client can cancel"));
    }
    if job.status != "open" || job.escrow_status != "unfunded" {
        return Err(ApiError::conflict("only open, unfunded jobs can be cancelled here"));
    }
    let job = sqlx::query_as::<_, Job>(&format!(
        "UPDATE jobs SET status='cancelled', updated_at=now() WHERE id=$1 RETURNING {JOB_COLS}"
    ))
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "job"))?;
    tracing::info!(job_id=%id, "job cancelled");
    Ok(Json(job))
}

#[derive(Deserialize, ToSchema)]
pub struct ChainLinkRequest { pub contract_job_id: i64, pub tx_hash: String }

/// Mirror the on-chain job id after the client has created and funded the
/// escrow job from their wallet.
#[utoipa::path(post, path = "/api/jobs/{id}/chain", request_body = ChainLinkRequest,
    responses((status = 200, body = Job), (status = 409, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state, req), fields(job_id = %id))]
pub async fn link_chain(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<ChainLinkRequest>,
) -> ApiResult<Json<Job>> {
    let job = jobs::fetch(&state.db, id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id != ident.user_id {
        return Err(ApiError::forbidden("only the job client can link the escrow"));
    }
    if job.contract_job_id.is_some() {
        return Err(ApiError::conflict("job is already linked on chain"));
    }
    if req.contract_job_id < 0 {
        return Err(ApiError::bad_request("contract_job_id must be non-negative"));
    }
    let job = sqlx::query_as::<_, Job>(&format!(
        "UPDATE jobs SET contract_job_id=$2, escrow_status='funded', updated_at=now() WHERE id=$1 RETURNING {JOB_COLS}"
    ))
    .bind(id)
    .bind(req.contract_job_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "job"))?;
    let _ = sqlx::query(
        "INSERT INTO transactions (job_id, user_id, tx_hash, tx_type, status, amount)
         VALUES ($1,$2,$3,'fund_escrow','confirmed',$4) ON CONFLICT (tx_hash) DO NOTHING",
    )
    .bind(id)
    .bind(ident.user_id)
    .bind(&req.tx_hash)
    .bind(job.budget)
    .execute(&state.db)
    .await;
    if let Some(freelancer) = job.freelancer_id {
        notify::push(&state.db, freelancer, "escrow_funded", "Escrow for your job has been funded", Some(id)).await;
    }
    tracing::info!(contract_job_id = req.contract_job_id, "job linked to escrow contract");
    Ok(Json(job))
}

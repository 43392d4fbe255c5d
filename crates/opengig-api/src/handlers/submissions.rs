use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::Submission;
use crate::services::{jobs, notify};
use crate::AppState;

const SUB_COLS: &str = "id, job_id, freelancer_id, file_name, cid, note, approved, approval_feedback, approved_at, created_at";

#[derive(Deserialize, ToSchema)]
pub struct SubmitRequest {
    pub job_id: Uuid,
    pub file_name: String,
    /// Content address returned by a prior /api/files upload.
    pub cid: String,
    pub note: Option<String>,
}

/// Deliver work for review. Moves the job to `submitted`.
#[utoipa::path(post, path = "/api/submissions", request_body = SubmitRequest,
    responses((status = 201, body = Submission), (status = 409, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state, req), fields(freelancer = %ident.wallet))]
pub async fn submit(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<Submission>)> {
    if req.cid.trim().is_empty() || req.file_name.trim().is_empty() {
        return Err(ApiError::bad_request("file_name and cid required"));
    }
    let job = jobs::fetch(&state.db, req.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.freelancer_id != Some(ident.user_id) {
        return Err(ApiError::forbidden("only the assigned freelancer can submit"));
    }
    if !matches!(job.status.as_str(), "assigned" | "in_progress") {
        return Err(ApiError::conflict("job is not accepting submissions"));
    }
    let sub = sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions (job_id, freelancer_id, file_name, cid, note) VALUES ($1,$2,$3,$4,$5) RETURNING {SUB_COLS}"
    ))
    .bind(req.job_id)
    .bind(ident.user_id)
    .bind(req.file_name.trim())
    .bind(req.cid.trim())
    .bind(req.note)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "submission"))?;
    jobs::set_status(&state.db, job.id, "submitted").await.map_err(|e| ApiError::from_db(e, "job"))?;
    notify::push(&state.db, job.client_id, "work_submitted", "Work was submitted for review", Some(job.id)).await;
    Ok((StatusCode::CREATED, Json(sub)))
}

pub async fn for_job(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Submission>>> {
    let job = jobs::fetch(&state.db, job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if !jobs::is_party(&job, ident.user_id) && !ident.is_admin() {
        return Err(ApiError::forbidden("not a party to this job"));
    }
    let rows = sqlx::query_as::<_, Submission>(&format!(
        "SELECT {SUB_COLS} FROM submissions WHERE job_id=$1 ORDER BY created_at DESC"
    ))
    .bind(job_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "submissions"))?;
    Ok(Json(rows))
}

#[derive(Deserialize, ToSchema)]
pub struct ReviewSubmissionRequest { pub feedback: Option<String> }

async fn fetch_submission(state: &AppState, id: Uuid) -> ApiResult<Submission> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {SUB_COLS} FROM submissions WHERE id=$1"))
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "submission"))
}

/// Client approves the delivered work.
pub async fn approve(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewSubmissionRequest>,
) -> ApiResult<Json<Submission>> {
    let sub = fetch_submission(&state, id).await?;
    let job = jobs::fetch(&state.db, sub.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id != ident.user_id {
        return Err(ApiError::forbidden("only the job client can approve"));
    }
    if sub.approved.is_some() {
        return Err(ApiError::conflict("submission already reviewed"));
    }
    let sub = sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions SET approved=TRUE, approval_feedback=$2, approved_at=now() WHERE id=$1 RETURNING {SUB_COLS}"
    ))
    .bind(id)
    .bind(req.feedback)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "submission"))?;
    notify::push(&state.db, sub.freelancer_id, "submission_approved", "Your submission was approved", Some(sub.job_id)).await;
    Ok(Json(sub))
}

/// Client rejects the delivered work; the job goes back to in_progress.
pub async fn reject(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewSubmissionRequest>,
) -> ApiResult<Json<Submission>> {
    let sub = fetch_submission(&state, id).await?;
    let job = jobs::fetch(&state.db, sub.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id != ident.user_id {
        return Err(ApiError::forbidden("only the job client can reject"));
    }
    if sub.approved.is_some() {
        return Err(ApiError::conflict("submission already reviewed"));
    }
    let sub = sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions SET approved=FALSE, approval_feedback=$2, approved_at=now() WHERE id=$1 RETURNING {SUB_COLS}"
    ))
    .bind(id)
    .bind(req.feedback)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "submission"))?;
    if job.status == "submitted" {
        jobs::set_status(&state.db, job.id, "in_progress").await.map_err(|e| ApiError::from_db(e, "job"))?;
    }
    notify::push(&state.db, sub.freelancer_id, "submission_rejected", "Your submission needs changes", Some(sub.job_id)).await;
    Ok(Json(sub))
}

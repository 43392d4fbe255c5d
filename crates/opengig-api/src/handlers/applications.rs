use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::Application;
use crate::services::{jobs, notify};
use crate::AppState;

const APP_COLS: &str = "id, job_id, freelancer_id, proposal, fee, status, created_at, updated_at";

#[derive(Deserialize, ToSchema)]
pub struct ApplyRequest { pub job_id: Uuid, pub proposal: String, pub fee: i64 }

/// Apply to an open job.
#[utoipa::path(post, path = "/api/applications", request_body = ApplyRequest,
    responses((status = 201, body = Application), (status = 409, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state, req), fields(freelancer = %ident.wallet))]
pub async fn apply(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Json(req): Json<ApplyRequest>,
) -> ApiResult<(StatusCode, Json<Application>)> {
    if req.proposal.trim().is_empty() {
        return Err(ApiError::bad_request("proposal required"));
    }
    if req.fee <= 0 {
        return Err(ApiError::bad_request("fee must be positive"));
    }
    let job = jobs::fetch(&state.db, req.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id == ident.user_id {
        return Err(ApiError::bad_request("cannot apply to your own job"));
    }
    if job.status != "open" {
        return Err(ApiError::conflict("job is not accepting applications"));
    }
    let app = sqlx::query_as::<_, Application>(&format!(
        "INSERT INTO applications (job_id, freelancer_id, proposal, fee) VALUES ($1,$2,$3,$4) RETURNING {APP_COLS}"
    ))
    .bind(req.job_id)
    .bind(ident.user_id)
    .bind(req.proposal.trim())
    .bind(req.fee)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "application"))?;
    notify::push(&state.db, job.client_id, "new_application", "A freelancer applied to your job", Some(job.id)).await;
    Ok((StatusCode::CREATED, Json(app)))
}

/// Applications for a job; visible to its client (and admins).
pub async fn for_job(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Application>>> {
    let job = jobs::fetch(&state.db, job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id != ident.user_id && !ident.is_admin() {
        return Err(ApiError::forbidden("not your job"));
    }
    let rows = sqlx::query_as::<_, Application>(&format!(
        "SELECT {APP_COLS} FROM applications WHERE job_id=$1 ORDER BY created_at DESC"
    ))
    .bind(job_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "applications"))?;
    Ok(Json(rows))
}

pub async fn mine(State(state): State<AppState>, Extension(ident): Extension<Identity>) -> ApiResult<Json<Vec<Application>>> {
    let rows = sqlx::query_as::<_, Application>(&format!(
        "SELECT {APP_COLS} FROM applications WHERE freelancer_id=$1 ORDER BY created_at DESC"
    ))
    .bind(ident.user_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "applications"))?;
    Ok(Json(rows))
}

async fn fetch_app(state: &AppState, id: Uuid) -> ApiResult<Application> {
    sqlx::query_as::<_, Application>(&format!("SELECT {APP_COLS} FROM applications WHERE id=$1"))
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "application"))
}

/// Accept an application: assigns the freelancer and rejects the siblings.
#[utoipa::path(post, path = "/api/applications/{id}/accept",
    responses((status = 200, body = Application), (status = 409, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state), fields(application_id = %id))]
pub async fn accept(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    let app = fetch_app(&state, id).await?;
    let job = jobs::fetch(&state.db, app.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id != ident.user_id {
        return Err(ApiError::forbidden("only the job client can accept"));
    }
    if job.status != "open" {
        return Err(ApiError::conflict("job already has an assigned freelancer"));
    }
    if app.status != "pending" {
        return Err(ApiError::conflict("application is not pending"));
    }
    let app = sqlx::query_as::<_, Application>(&format!(
        "UPDATE applications SET status='accepted', updated_at=now() WHERE id=$1 RETURNING {APP_COLS}"
    ))
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "application"))?;
    let _ = sqlx::query(
        "UPDATE applications SET status='rejected', updated_at=now() WHERE job_id=$1 AND id<>$2 AND status='pending'",
    )
    .bind(app.job_id)
    .bind(id)
    .execute(&state.db)
    .await;
    sqlx::query("UPDATE jobs SET freelancer_id=$2, status='assigned', updated_at=now() WHERE id=$1")
        .bind(app.job_id)
        .bind(app.freelancer_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "job"))?;
    notify::push(&state.db, app.freelancer_id, "application_accepted", "Your application was accepted", Some(app.job_id)).await;
    tracing::info!(job_id=%app.job_id, freelancer=%app.freelancer_id, "application accepted");
    Ok(Json(app))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    let app = fetch_app(&state, id).await?;
    let job = jobs::fetch(&state.db, app.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.client_id != ident.user_id {
        return Err(ApiError::forbidden("only the job client can reject"));
    }
    if app.status != "pending" {
        return Err(ApiError::conflict("application is not pending"));
    }
    let app = sqlx::query_as::<_, Application>(&format!(
        "UPDATE applications SET status='rejected', updated_at=now() WHERE id=$1 RETURNING {APP_COLS}"
    ))
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "application"))?;
    notify::push(&state.db, app.freelancer_id, "application_rejected", "Your application was rejected", Some(app.job_id)).await;
    Ok(Json(app))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Application>> {
    let app = fetch_app(&state, id).await?;
    if app.freelancer_id != ident.user_id {
        return Err(ApiError::forbidden("not your application"));
    }
    if app.status != "pending" {
        return Err(ApiError::conflict("only pending applications can be withdrawn"));
    }
    let app = sqlx::query_as::<_, Application>(&format!(
        "UPDATE applications SET status='withdrawn', updated_at=now() WHERE id=$1 RETURNING {APP_COLS}"
    ))
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "application"))?;
    Ok(Json(app))
}

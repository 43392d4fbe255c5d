use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_admin, Identity};
use crate::chain::get_chain;
use crate::error::{ApiError, ApiResult};
use crate::models::{Dispute, DisputeEvidence};
use crate::services::{jobs, notify};
use crate::telemetry::DISPUTES_RESOLVED;
use crate::AppState;
use opengig_chain::DisputeOutcome;

const DISPUTE_COLS: &str = "id, job_id, raised_by, client_id, freelancer_id, reason, status, resolution_notes, resolved_by, resolved_at, resolution_tx_hash, created_at";
const EVIDENCE_COLS: &str = "id, dispute_id, uploader_id, file_name, cid, description, created_at";

#[derive(Deserialize, ToSchema)]
pub struct OpenDisputeRequest { pub job_id: Uuid, pub reason: String }

/// Open a dispute over an active job. Moves the job to `disputed`.
#[utoipa::path(post, path = "/api/disputes", request_body = OpenDisputeRequest,
    responses((status = 201, body = Dispute), (status = 409, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state, req), fields(raised_by = %ident.wallet))]
pub async fn open_dispute(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Json(req): Json<OpenDisputeRequest>,
) -> ApiResult<(StatusCode, Json<Dispute>)> {
    if req.reason.trim().is_empty() {
        return Err(ApiError::bad_request("reason required"));
    }
    let job = jobs::fetch(&state.db, req.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if !jobs::is_party(&job, ident.user_id) {
        return Err(ApiError::forbidden("not a party to this job"));
    }
    let Some(freelancer_id) = job.freelancer_id else {
        return Err(ApiError::conflict("job has no assigned freelancer to dispute with"));
    };
    if !matches!(job.status.as_str(), "assigned" | "in_progress" | "submitted") {
        return Err(ApiError::conflict("job is not in a disputable state"));
    }
    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM disputes WHERE job_id=$1 AND status IN ('open','under_review')",
    )
    .bind(job.id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "disputes"))?;
    if existing > 0 {
        return Err(ApiError::conflict("job already has an active dispute"));
    }
    let dispute = sqlx::query_as::<_, Dispute>(&format!(
        "INSERT INTO disputes (job_id, raised_by, client_id, freelancer_id, reason)
         VALUES ($1,$2,$3,$4,$5) RETURNING {DISPUTE_COLS}"
    ))
    .bind(job.id)
    .bind(ident.user_id)
    .bind(job.client_id)
    .bind(freelancer_id)
    .bind(req.reason.trim())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "dispute"))?;
    jobs::set_status(&state.db, job.id, "disputed").await.map_err(|e| ApiError::from_db(e, "job"))?;
    if let Some(other) = jobs::counterparty(&job, ident.user_id) {
        notify::push(&state.db, other, "dispute_opened", "A dispute was opened on your job", Some(job.id)).await;
    }
    tracing::info!(dispute_id=%dispute.id, job_id=%job.id, "dispute opened");
    Ok((StatusCode::CREATED, Json(dispute)))
}

#[derive(Deserialize, ToSchema)]
pub struct DisputeQuery { pub status: Option<String>, pub limit: Option<i64>, pub offset: Option<i64> }

/// Admins see every dispute; parties see their own.
pub async fn list_disputes(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Query(q): Query<DisputeQuery>,
) -> ApiResult<Json<Vec<Dispute>>> {
    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let offset = q.offset.unwrap_or(0).max(0);
    let rows = if ident.is_admin() {
        sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {DISPUTE_COLS} FROM disputes
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(q.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
    } else {
        sqlx::query_as::<_, Dispute>(&format!(
            "SELECT {DISPUTE_COLS} FROM disputes
             WHERE (client_id = $1 OR freelancer_id = $1) AND ($2::text IS NULL OR status = $2)
             ORDER BY created_at DESC LIMIT $3 OFFSET $4"
        ))
        .bind(ident.user_id)
        .bind(q.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await
    };
    Ok(Json(rows.map_err(|e| ApiError::from_db(e, "disputes"))?))
}

#[derive(Serialize, ToSchema)]
pub struct DisputeDetail {
    #[serde(flatten)]
    pub dispute: Dispute,
    pub evidence: Vec<DisputeEvidence>,
}

async fn fetch_dispute(state: &AppState, id: Uuid) -> ApiResult<Dispute> {
    sqlx::query_as::<_, Dispute>(&format!("SELECT {DISPUTE_COLS} FROM disputes WHERE id=$1"))
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "dispute"))
}

fn dispute_party(d: &Dispute, user_id: Uuid) -> bool {
    d.client_id == user_id || d.freelancer_id == user_id
}

pub async fn get_dispute(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DisputeDetail>> {
    let dispute = fetch_dispute(&state, id).await?;
    if !dispute_party(&dispute, ident.user_id) && !ident.is_admin() {
        return Err(ApiError::forbidden("not a party to this dispute"));
    }
    let evidence = sqlx::query_as::<_, DisputeEvidence>(&format!(
        "SELECT {EVIDENCE_COLS} FROM dispute_evidence WHERE dispute_id=$1 ORDER BY created_at"
    ))
    .bind(id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "evidence"))?;
    Ok(Json(DisputeDetail { dispute, evidence }))
}

#[derive(Deserialize, ToSchema)]
pub struct EvidenceRequest { pub file_name: String, pub cid: String, pub description: Option<String> }

/// Attach an uploaded file as evidence while the dispute is open.
pub async fn add_evidence(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<EvidenceRequest>,
) -> ApiResult<(StatusCode, Json<DisputeEvidence>)> {
    if req.cid.trim().is_empty() || req.file_name.trim().is_empty() {
        return Err(ApiError::bad_request("file_name and cid required"));
    }
    let dispute = fetch_dispute(&state, id).await?;
    if !dispute_party(&dispute, ident.user_id) {
        return Err(ApiError::forbidden("not a party to this dispute"));
    }
    if !matches!(dispute.status.as_str(), "open" | "under_review") {
        return Err(ApiError::conflict("dispute is no longer accepting evidence"));
    }
    let ev = sqlx::query_as::<_, DisputeEvidence>(&format!(
        "INSERT INTO dispute_evidence (dispute_id, uploader_id, file_name, cid, description)
         VALUES ($1,$2,$3,$4,$5) RETURNING {EVIDENCE_COLS}"
    ))
    .bind(id)
    .bind(ident.user_id)
    .bind(req.file_name.trim())
    .bind(req.cid.trim())
    .bind(req.description)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "evidence"))?;
    Ok((StatusCode::CREATED, Json(ev)))
}

/// Admin takes the dispute under review.
pub async fn review(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Dispute>> {
    require_admin(&ident)?;
    let dispute = fetch_dispute(&state, id).await?;
    if dispute.status != "open" {
        return Err(ApiError::conflict("dispute is not open"));
    }
    let dispute = sqlx::query_as::<_, Dispute>(&format!(
        "UPDATE disputes SET status='under_review' WHERE id=$1 RETURNING {DISPUTE_COLS}"
    ))
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "dispute"))?;
    Ok(Json(dispute))
}

#[derive(Deserialize, ToSchema)]
pub struct ResolveRequest {
    /// `client`, `freelancer`, or `split`.
    pub outcome: String,
    pub notes: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ResolveResponse {
    #[serde(flatten)]
    pub dispute: Dispute,
    /// Set when the configured resolver wallet submitted resolveDispute.
    pub chain_error: Option<String>,
}

/// Admin decides the dispute. Updates the dispute, the job, and the escrow
/// mirror in sequence, then submits `resolveDispute` through the resolver
/// wallet when one is configured. The document writes are independent; a
/// failure partway leaves earlier writes in place (matching the original
/// system's behavior, which had no cross-document transactions).
#[utoipa::path(post, path = "/api/disputes/{id}/resolve", request_body = ResolveRequest,
    responses((status = 200, body = ResolveResponse), (status = 403, body = crate::error::ApiErrorBody)))]
#[tracing::instrument(level = "info", skip(state, req), fields(dispute_id = %id, admin = %ident.wallet))]
pub async fn resolve(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    require_admin(&ident)?;
    let dispute = fetch_dispute(&state, id).await?;
    if !matches!(dispute.status.as_str(), "open" | "under_review") {
        return Err(ApiError::conflict("dispute already resolved"));
    }
    let (dispute_status, job_status, escrow_status, outcome) = match req.outcome.as_str() {
        "client" => ("resolved_client", "cancelled", "refunded", DisputeOutcome::RefundClient),
        "freelancer" => ("resolved_freelancer", "completed", "released", DisputeOutcome::PayFreelancer),
        "split" => ("resolved_admin", "completed", "released", DisputeOutcome::Split),
        _ => return Err(ApiError::bad_request("outcome must be client, freelancer or split")),
    };
    let job = jobs::fetch(&state.db, dispute.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;

    // Chain call first when we are able to make it, so the recorded
    // resolution can carry the tx hash.
    let mut chain_error = None;
    let mut tx_hash: Option<String> = None;
    if let (Some(contract_job_id), Some(chain)) = (job.contract_job_id, get_chain()) {
        if chain.has_resolver() {
            match chain.resolve_dispute(contract_job_id as u64, outcome).await {
                Ok(hash) => tx_hash = Some(hash),
                Err(e) => {
                    tracing::warn!(error=%e, "resolveDispute submission failed");
                    chain_error = Some(e.to_string());
                }
            }
        }
    }

    let dispute = sqlx::query_as::<_, Dispute>(&format!(
        "UPDATE disputes SET status=$2, resolution_notes=$3, resolved_by=$4, resolved_at=now(), resolution_tx_hash=$5
         WHERE id=$1 RETURNING {DISPUTE_COLS}"
    ))
    .bind(id)
    .bind(dispute_status)
    .bind(req.notes)
    .bind(ident.user_id)
    .bind(&tx_hash)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "dispute"))?;
    jobs::set_status(&state.db, job.id, job_status).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if job.escrow_status == "funded" {
        jobs::set_escrow_status(&state.db, job.id, escrow_status).await.map_err(|e| ApiError::from_db(e, "job"))?;
    }
    if let Some(hash) = &tx_hash {
        let _ = sqlx::query(
            "INSERT INTO transactions (job_id, user_id, tx_hash, tx_type, status)
             VALUES ($1,$2,$3,'resolve_dispute','pending') ON CONFLICT (tx_hash) DO NOTHING",
        )
        .bind(job.id)
        .bind(ident.user_id)
        .bind(hash)
        .execute(&state.db)
        .await;
    }
    notify::push(&state.db, dispute.client_id, "dispute_resolved", "Your dispute was resolved", Some(dispute.id)).await;
    notify::push(&state.db, dispute.freelancer_id, "dispute_resolved", "Your dispute was resolved", Some(dispute.id)).await;
    DISPUTES_RESOLVED.with_label_values(&[&req.outcome]).inc();
    tracing::info!(outcome=%req.outcome, tx_hash=?tx_hash, "dispute resolved");
    Ok(Json(ResolveResponse { dispute, chain_error }))
}

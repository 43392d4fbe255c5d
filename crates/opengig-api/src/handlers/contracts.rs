use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::chain::get_chain;
use crate::error::{ApiError, ApiResult};
use crate::models::Transaction;
use crate::services::jobs;
use crate::AppState;
use opengig_chain::{OnChainJob, ESCROW_ABI};

const TX_COLS: &str = "id, job_id, user_id, tx_hash, tx_type, status, amount, created_at";

#[derive(Serialize, ToSchema)]
pub struct ContractInfo {
    pub contract_address: String,
    pub chain_id: u64,
    pub resolver_enabled: bool,
    /// Human-readable ABI fragment the frontend binds against.
    pub methods: Vec<String>,
}

/// The deployed escrow contract the frontend should talk to.
#[utoipa::path(get, path = "/api/contracts/info",
    responses((status = 200, body = ContractInfo), (status = 503, body = crate::error::ApiErrorBody)))]
pub async fn info() -> ApiResult<Json<ContractInfo>> {
    let chain = get_chain().ok_or_else(|| ApiError::service_unavailable("no escrow contract configured"))?;
    Ok(Json(ContractInfo {
        contract_address: chain.contract_address(),
        chain_id: chain.chain_id(),
        resolver_enabled: chain.has_resolver(),
        methods: ESCROW_ABI.iter().map(|s| s.to_string()).collect(),
    }))
}

/// Read-through mirror of a job's on-chain state.
#[utoipa::path(get, path = "/api/contracts/jobs/{contract_job_id}",
    responses((status = 200, description = "On-chain job state"), (status = 502, body = crate::error::ApiErrorBody)))]
pub async fn on_chain_job(Path(contract_job_id): Path<u64>) -> ApiResult<Json<OnChainJob>> {
    let chain = get_chain().ok_or_else(|| ApiError::service_unavailable("no escrow contract configured"))?;
    let job = chain
        .get_job(contract_job_id)
        .await
        .map_err(|e| ApiError::bad_gateway(format!("escrow contract read: {e}")))?;
    Ok(Json(job))
}

#[derive(Deserialize, ToSchema)]
pub struct RecordTxRequest {
    pub job_id: Option<Uuid>,
    pub tx_hash: String,
    pub tx_type: String,
    pub status: Option<String>,
    pub amount: Option<i64>,
}

/// Frontend reports an on-chain action for the audit log.
#[utoipa::path(post, path = "/api/contracts/transactions", request_body = RecordTxRequest,
    responses((status = 201, body = Transaction), (status = 409, body = crate::error::ApiErrorBody)))]
pub async fn record_transaction(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Json(req): Json<RecordTxRequest>,
) -> ApiResult<(StatusCode, Json<Transaction>)> {
    if req.tx_hash.trim().is_empty() {
        return Err(ApiError::bad_request("tx_hash required"));
    }
    const TYPES: &[&str] = &["fund_escrow", "pay_milestone", "release", "refund", "resolve_dispute", "other"];
    if !TYPES.contains(&req.tx_type.as_str()) {
        return Err(ApiError::bad_request("unknown tx_type"));
    }
    let status = req.status.as_deref().unwrap_or("pending");
    if !["pending", "confirmed", "failed"].contains(&status) {
        return Err(ApiError::bad_request("status must be pending, confirmed or failed"));
    }
    let tx = sqlx::query_as::<_, Transaction>(&format!(
        "INSERT INTO transactions (job_id, user_id, tx_hash, tx_type, status, amount)
         VALUES ($1,$2,$3,$4,$5,$6) RETURNING {TX_COLS}"
    ))
    .bind(req.job_id)
    .bind(ident.user_id)
    .bind(req.tx_hash.trim())
    .bind(&req.tx_type)
    .bind(status)
    .bind(req.amount)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "transaction"))?;
    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn transactions_for_job(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Transaction>>> {
    let job = jobs::fetch(&state.db, job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if !jobs::is_party(&job, ident.user_id) && !ident.is_admin() {
        return Err(ApiError::forbidden("not a party to this job"));
    }
    let rows = sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {TX_COLS} FROM transactions WHERE job_id=$1 ORDER BY created_at DESC"
    ))
    .bind(job_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "transactions"))?;
    Ok(Json(rows))
}

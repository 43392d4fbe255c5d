use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::Message;
use crate::services::{jobs, notify};
use crate::AppState;

const MSG_COLS: &str = "id, job_id, sender_id, recipient_id, body, read, created_at";

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest { pub job_id: Uuid, pub body: String }

/// Send a message to the other party of a job.
pub async fn send(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    if req.body.trim().is_empty() {
        return Err(ApiError::bad_request("body required"));
    }
    let job = jobs::fetch(&state.db, req.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if !jobs::is_party(&job, ident.user_id) {
        return Err(ApiError::forbidden("not a party to this job"));
    }
    let Some(recipient) = jobs::counterparty(&job, ident.user_id) else {
        return Err(ApiError::conflict("job has no counterparty yet"));
    };
    let msg = sqlx::query_as::<_, Message>(&format!(
        "INSERT INTO messages (job_id, sender_id, recipient_id, body) VALUES ($1,$2,$3,$4) RETURNING {MSG_COLS}"
    ))
    .bind(req.job_id)
    .bind(ident.user_id)
    .bind(recipient)
    .bind(req.body.trim())
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "message"))?;
    notify::push(&state.db, recipient, "new_message", "You have a new message", Some(job.id)).await;
    Ok((StatusCode::CREATED, Json(msg)))
}

/// Conversation for a job, oldest first. Fetching marks the caller's incoming
/// messages as read.
pub async fn conversation(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Message>>> {
    let job = jobs::fetch(&state.db, job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if !jobs::is_party(&job, ident.user_id) && !ident.is_admin() {
        return Err(ApiError::forbidden("not a party to this job"));
    }
    let rows = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MSG_COLS} FROM messages WHERE job_id=$1 ORDER BY created_at"
    ))
    .bind(job_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "messages"))?;
    let _ = sqlx::query("UPDATE messages SET read=TRUE WHERE job_id=$1 AND recipient_id=$2 AND NOT read")
        .bind(job_id)
        .bind(ident.user_id)
        .execute(&state.db)
        .await;
    Ok(Json(rows))
}

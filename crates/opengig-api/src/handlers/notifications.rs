use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::Notification;
use crate::AppState;

const NOTIF_COLS: &str = "id, user_id, kind, body, reference_id, read, created_at";

#[derive(Deserialize, ToSchema)]
pub struct NotificationQuery { pub unread: Option<bool>, pub limit: Option<i64>, pub offset: Option<i64> }

pub async fn list(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Query(q): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let limit = q.limit.unwrap_or(50).clamp(1, 200);
    let offset = q.offset.unwrap_or(0).max(0);
    let rows = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {NOTIF_COLS} FROM notifications
         WHERE user_id=$1 AND ($2::bool IS NULL OR read = NOT $2)
         ORDER BY created_at DESC LIMIT $3 OFFSET $4"
    ))
    .bind(ident.user_id)
    .bind(q.unread)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "notifications"))?;
    Ok(Json(rows))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    let n = sqlx::query_as::<_, Notification>(&format!(
        "UPDATE notifications SET read=TRUE WHERE id=$1 AND user_id=$2 RETURNING {NOTIF_COLS}"
    ))
    .bind(id)
    .bind(ident.user_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "notification"))?;
    Ok(Json(n))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
) -> ApiResult<Json<serde_json::Value>> {
    let updated = sqlx::query("UPDATE notifications SET read=TRUE WHERE user_id=$1 AND NOT read")
        .bind(ident.user_id)
        .execute(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "notifications"))?
        .rows_affected();
    Ok(Json(serde_json::json!({ "updated": updated })))
}

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::ipfs::get_ipfs;
use crate::models::StoredFile;
use crate::telemetry::FILE_UPLOAD_BYTES;
use crate::AppState;

const FILE_COLS: &str = "id, owner_id, file_name, content_type, size_bytes, cid, created_at";

static UPLOAD_SEMAPHORE: once_cell::sync::Lazy<tokio::sync::Semaphore> = once_cell::sync::Lazy::new(|| {
    let max = std::env::var("OPENGIG_MAX_CONCURRENT_UPLOADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(16);
    tokio::sync::Semaphore::new(max)
});

fn max_upload_bytes() -> usize {
    std::env::var("OPENGIG_MAX_UPLOAD_BYTES").ok().and_then(|v| v.parse().ok()).unwrap_or(10 * 1024 * 1024)
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub cid: String,
    pub file_name: String,
    pub size_bytes: i64,
    pub url: String,
    pub duplicate: bool,
}

/// Buffer a multipart upload and pin it through the IPFS gateway. The same
/// content uploaded twice resolves to the same CID and is reported as a
/// duplicate rather than re-recorded.
#[utoipa::path(post, path = "/api/files",
    responses((status = 201, body = UploadResponse), (status = 400, body = crate::error::ApiErrorBody)))]
pub async fn upload(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let _permit = UPLOAD_SEMAPHORE
        .acquire()
        .await
        .map_err(|_| ApiError::internal("upload semaphore closed"))?;
    let max = max_upload_bytes();
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                if file_name.is_none() {
                    file_name = field.file_name().map(|s| s.to_string());
                }
                content_type = field.content_type().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("read upload: {e}")))?;
                if data.len() > max {
                    return Err(ApiError::bad_request(format!("file exceeds max {max} bytes")));
                }
                bytes = Some(data.to_vec());
            }
            Some("file_name") => {
                if let Ok(val) = field.text().await {
                    file_name = Some(val);
                }
            }
            _ => {}
        }
    }
    let Some(bytes) = bytes else {
        return Err(ApiError::bad_request("missing file field"));
    };
    let file_name = file_name.unwrap_or_else(|| "upload.bin".into());
    let size = bytes.len() as i64;
    let store = get_ipfs().store();
    let cid = store
        .add(&file_name, bytes)
        .await
        .map_err(|e| ApiError::bad_gateway(format!("pinning gateway: {e}")))?;
    // Same content twice is fine; keep the first record.
    if let Some(existing) = sqlx::query_as::<_, StoredFile>(&format!("SELECT {FILE_COLS} FROM stored_files WHERE cid=$1"))
        .bind(&cid)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "file"))?
    {
        return Ok((
            StatusCode::OK,
            Json(UploadResponse {
                url: store.public_url(&existing.cid),
                cid: existing.cid,
                file_name: existing.file_name,
                size_bytes: existing.size_bytes,
                duplicate: true,
            }),
        ));
    }
    let rec = sqlx::query_as::<_, StoredFile>(&format!(
        "INSERT INTO stored_files (owner_id, file_name, content_type, size_bytes, cid)
         VALUES ($1,$2,$3,$4,$5) RETURNING {FILE_COLS}"
    ))
    .bind(ident.user_id)
    .bind(&file_name)
    .bind(content_type)
    .bind(size)
    .bind(&cid)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "file"))?;
    FILE_UPLOAD_BYTES.inc_by(size as u64);
    tracing::info!(cid=%rec.cid, size_bytes=size, "file pinned");
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: store.public_url(&rec.cid),
            cid: rec.cid,
            file_name: rec.file_name,
            size_bytes: rec.size_bytes,
            duplicate: false,
        }),
    ))
}

pub async fn metadata(State(state): State<AppState>, Path(cid): Path<String>) -> ApiResult<Json<StoredFile>> {
    let rec = sqlx::query_as::<_, StoredFile>(&format!("SELECT {FILE_COLS} FROM stored_files WHERE cid=$1"))
        .bind(&cid)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "file"))?;
    Ok(Json(rec))
}

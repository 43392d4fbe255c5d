use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Identity;
use crate::error::{ApiError, ApiResult};
use crate::models::Review;
use crate::services::jobs;
use crate::wallet::normalize_wallet;
use crate::AppState;

const REVIEW_COLS: &str = "id, job_id, reviewer_id, reviewee_id, rating, comment, created_at";

#[derive(Deserialize, ToSchema)]
pub struct CreateReviewRequest { pub job_id: Uuid, pub rating: i32, pub comment: Option<String> }

/// Either party reviews the other once the job is completed.
pub async fn create(
    State(state): State<AppState>,
    Extension(ident): Extension<Identity>,
    Json(req): Json<CreateReviewRequest>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::bad_request("rating must be between 1 and 5"));
    }
    let job = jobs::fetch(&state.db, req.job_id).await.map_err(|e| ApiError::from_db(e, "job"))?;
    if !jobs::is_party(&job, ident.user_id) {
        return Err(ApiError::forbidden("not a party to this job"));
    }
    if job.status != "completed" {
        return Err(ApiError::conflict("job is not completed"));
    }
    let Some(reviewee) = jobs::counterparty(&job, ident.user_id) else {
        return Err(ApiError::conflict("job has no counterparty"));
    };
    let review = sqlx::query_as::<_, Review>(&format!(
        "INSERT INTO reviews (job_id, reviewer_id, reviewee_id, rating, comment)
         VALUES ($1,$2,$3,$4,$5) RETURNING {REVIEW_COLS}"
    ))
    .bind(req.job_id)
    .bind(ident.user_id)
    .bind(reviewee)
    .bind(req.rating)
    .bind(req.comment)
    .fetch_one(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "review"))?;
    Ok((StatusCode::CREATED, Json(review)))
}

#[derive(Serialize, ToSchema)]
pub struct ReviewSummary {
    pub average_rating: Option<f64>,
    pub count: i64,
    pub reviews: Vec<Review>,
}

/// Reviews received by a wallet, with the running average.
pub async fn for_user(State(state): State<AppState>, Path(wallet): Path<String>) -> ApiResult<Json<ReviewSummary>> {
    let wallet = normalize_wallet(&wallet).ok_or_else(|| ApiError::bad_request("invalid wallet address"))?;
    let user_id: Uuid = sqlx::query_scalar("SELECT id FROM users WHERE wallet_address=$1")
        .bind(&wallet)
        .fetch_one(&state.db)
        .await
        .map_err(|e| ApiError::from_db(e, "user"))?;
    let reviews = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLS} FROM reviews WHERE reviewee_id=$1 ORDER BY created_at DESC"
    ))
    .bind(user_id)
    .fetch_all(&state.db)
    .await
    .map_err(|e| ApiError::from_db(e, "reviews"))?;
    let (average_rating, count): (Option<f64>, i64) =
        sqlx::query_as("SELECT AVG(rating)::float8, COUNT(*) FROM reviews WHERE reviewee_id=$1")
            .bind(user_id)
            .fetch_one(&state.db)
            .await
            .map_err(|e| ApiError::from_db(e, "reviews"))?;
    Ok(Json(ReviewSummary { average_rating, count, reviews }))
}

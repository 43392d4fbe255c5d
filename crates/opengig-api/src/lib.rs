pub mod auth;
pub mod chain;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ipfs;
pub mod models;
pub mod services;
pub mod telemetry;
pub mod test_support;
pub mod wallet;

use axum::response::Html;
use axum::routing::{get, post};
use axum::{middleware, Router};
use sqlx::{Pool, Postgres};
use utoipa::OpenApi;

use crate::telemetry::metrics_handler;
use handlers::{
    admin, applications, auth as auth_handlers, contracts, disputes, files, health::health,
    jobs, messages, milestones, notifications, readiness::{readiness, startupz}, reviews,
    submissions, users,
};

#[derive(Clone)]
pub struct AppState { pub db: Pool<Postgres> }

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::readiness::readiness,
        handlers::readiness::startupz,
        handlers::auth::nonce,
        handlers::auth::verify,
        handlers::jobs::create_job,
        handlers::jobs::list_jobs,
        handlers::jobs::get_job,
        handlers::jobs::link_chain,
        handlers::applications::apply,
        handlers::applications::accept,
        handlers::milestones::complete,
        handlers::milestones::pay,
        handlers::submissions::submit,
        handlers::disputes::open_dispute,
        handlers::disputes::resolve,
        handlers::contracts::info,
        handlers::contracts::on_chain_job,
        handlers::contracts::record_transaction,
        handlers::files::upload,
    ),
    components(schemas(error::ApiErrorBody)),
    tags( (name = "opengig", description = "opengig marketplace API") )
)]
pub struct ApiDoc;

async fn swagger_ui() -> Html<String> {
    let html = r#"<!DOCTYPE html>
<html lang=\"en\">
<head><meta charset=\"UTF-8\"/><title>opengig API Docs</title>
<link rel=\"stylesheet\" href=\"https://unpkg.com/swagger-ui-dist@5/swagger-ui.css\" />
</head>
<body>
<div id=\"swagger-ui\"></div>
<script src=\"https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js\"></script>
<script>
window.onload = () => { SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' }); };
</script>
</body></html>"#;
    Html(html.to_string())
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/auth/nonce", post(auth_handlers::nonce))
        .route("/auth/verify", post(auth_handlers::verify))
        .route("/users/me", get(users::me).put(users::update_me))
        .route("/users/:wallet", get(users::by_wallet))
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job).put(jobs::update_job).delete(jobs::cancel_job))
        .route("/jobs/:id/chain", post(jobs::link_chain))
        .route("/applications", post(applications::apply))
        .route("/applications/mine", get(applications::mine))
        .route("/applications/job/:job_id", get(applications::for_job))
        .route("/applications/:id/accept", post(applications::accept))
        .route("/applications/:id/reject", post(applications::reject))
        .route("/applications/:id/withdraw", post(applications::withdraw))
        .route("/milestones/job/:job_id", get(milestones::for_job))
        .route("/milestones/:id/complete", post(milestones::complete))
        .route("/milestones/:id/pay", post(milestones::pay))
        .route("/submissions", post(submissions::submit))
        .route("/submissions/job/:job_id", get(submissions::for_job))
        .route("/submissions/:id/approve", post(submissions::approve))
        .route("/submissions/:id/reject", post(submissions::reject))
        .route("/disputes", post(disputes::open_dispute).get(disputes::list_disputes))
        .route("/disputes/:id", get(disputes::get_dispute))
        .route("/disputes/:id/evidence", post(disputes::add_evidence))
        .route("/disputes/:id/review", post(disputes::review))
        .route("/disputes/:id/resolve", post(disputes::resolve))
        .route("/contracts/info", get(contracts::info))
        .route("/contracts/jobs/:contract_job_id", get(contracts::on_chain_job))
        .route("/contracts/transactions", post(contracts::record_transaction))
        .route("/contracts/transactions/job/:job_id", get(contracts::transactions_for_job))
        .route("/files", post(files::upload))
        .route("/files/:cid", get(files::metadata))
        .route("/messages", post(messages::send))
        .route("/messages/job/:job_id", get(messages::conversation))
        .route("/notifications", get(notifications::list))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/:id/read", post(notifications::mark_read))
        .route("/reviews", post(reviews::create))
        .route("/reviews/user/:wallet", get(reviews::for_user))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/:id/role", post(admin::set_role))
        .route("/admin/disputes", get(admin::dispute_queue))
}

pub fn build_router(state: AppState) -> Router {
    let openapi = ApiDoc::openapi();
    // Expired-nonce GC loop (single-use nonces that never get signed).
    let db_gc = state.db.clone();
    tokio::spawn(async move {
        let ttl = std::env::var("OPENGIG_NONCE_TTL_SECS").ok().and_then(|v| v.parse::<i64>().ok()).unwrap_or(300);
        let interval = std::env::var("OPENGIG_NONCE_GC_INTERVAL_SECS").ok().and_then(|v| v.parse::<u64>().ok()).unwrap_or(60);
        loop {
            if let Ok(deleted) = auth_handlers::run_nonce_gc(&db_gc, ttl).await {
                if deleted > 0 { tracing::debug!(deleted, "expired nonces removed"); }
            }
            tokio::time::sleep(std::time::Duration::from_secs(interval.max(5))).await;
        }
    });
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readiness))
        .route("/startupz", get(startupz))
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(|| async move { axum::Json(openapi.clone()) }))
        .route("/swagger", get(swagger_ui))
        .nest("/api", api_router())
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn health_ok() {
        let pool = test_support::test_pool().await;
        let app = build_router(AppState { db: pool });
        let res = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v, json!({"status":"ok"}));
    }

    #[tokio::test]
    async fn api_requires_bearer_token() {
        let pool = test_support::test_pool().await;
        let app = build_router(AppState { db: pool });
        let res = app
            .oneshot(Request::builder().uri("/api/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn nonce_requires_valid_wallet() {
        let pool = test_support::test_pool().await;
        let app = build_router(AppState { db: pool });
        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/nonce")
            .header("content-type", "application/json")
            .body(Body::from(json!({"wallet_address": "nope"}).to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn readiness_ok() {
        let pool = test_support::test_pool().await;
        let app = build_router(AppState { db: pool });
        let res = app.oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
}

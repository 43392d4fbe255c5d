use axum::body::Body;
use axum::http::{Request, StatusCode};
use opengig_api::test_support::{self, seed_user, token_for};
use opengig_api::build_router;
use serde_json::json;
use sqlx::{Pool, Postgres};
use tower::util::ServiceExt;
use uuid::Uuid;

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn seed_assigned_job(pool: &Pool<Postgres>, client_id: Uuid, freelancer_id: Uuid) -> (Uuid, Uuid, Uuid) {
    let job_id: Uuid = sqlx::query_scalar(
        "INSERT INTO jobs (client_id, freelancer_id, title, description, budget, status, escrow_status)
         VALUES ($1,$2,'job','d',300,'assigned','funded') RETURNING id",
    )
    .bind(client_id)
    .bind(freelancer_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let m1: Uuid = sqlx::query_scalar(
        "INSERT INTO milestones (job_id, position, title, amount) VALUES ($1,0,'first',100) RETURNING id",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await
    .unwrap();
    let m2: Uuid = sqlx::query_scalar(
        "INSERT INTO milestones (job_id, position, title, amount) VALUES ($1,1,'second',200) RETURNING id",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await
    .unwrap();
    (job_id, m1, m2)
}

#[tokio::test]
#[serial_test::serial]
async fn complete_moves_job_in_progress() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000b1", "client").await;
    let freelancer = seed_user(&pool, "0x00000000000000000000000000000000000000b2", "freelancer").await;
    let (job_id, m1, _m2) = seed_assigned_job(&pool, client.id, freelancer.id).await;

    // Client cannot complete the freelancer's work.
    let res = app
        .clone()
        .oneshot(post_json(&format!("/api/milestones/{m1}/complete"), &token_for(&client), json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .clone()
        .oneshot(post_json(&format!("/api/milestones/{m1}/complete"), &token_for(&freelancer), json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["completed"], json!(true));

    let status: String = sqlx::query_scalar("SELECT status FROM jobs WHERE id=$1")
        .bind(job_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "in_progress");

    // Completing twice conflicts.
    let res = app
        .oneshot(post_json(&format!("/api/milestones/{m1}/complete"), &token_for(&freelancer), json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[serial_test::serial]
async fn pay_requires_completion_first() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000b3", "client").await;
    let freelancer = seed_user(&pool, "0x00000000000000000000000000000000000000b4", "freelancer").await;
    let (_job_id, m1, _m2) = seed_assigned_job(&pool, client.id, freelancer.id).await;

    let res = app
        .oneshot(post_json(
            &format!("/api/milestones/{m1}/pay"),
            &token_for(&client),
            json!({"tx_hash": "0xabc1"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[serial_test::serial]
async fn paying_last_milestone_completes_job() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000b5", "client").await;
    let freelancer = seed_user(&pool, "0x00000000000000000000000000000000000000b6", "freelancer").await;
    let (job_id, m1, m2) = seed_assigned_job(&pool, client.id, freelancer.id).await;
    let ftoken = token_for(&freelancer);
    let ctoken = token_for(&client);

    for m in [m1, m2] {
        let res = app
            .clone()
            .oneshot(post_json(&format!("/api/milestones/{m}/complete"), &ftoken, json!({})))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = app
        .clone()
        .oneshot(post_json(&format!("/api/milestones/{m1}/pay"), &ctoken, json!({"tx_hash": "0xabc2"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let status: String = sqlx::query_scalar("SELECT status FROM jobs WHERE id=$1").bind(job_id).fetch_one(&pool).await.unwrap();
    assert_eq!(status, "in_progress");

    let res = app
        .clone()
        .oneshot(post_json(&format!("/api/milestones/{m2}/pay"), &ctoken, json!({"tx_hash": "0xabc3"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["paid"], json!(true));
    assert_eq!(v["payment_tx_hash"], json!("0xabc3"));

    let (status, escrow): (String, String) = sqlx::query_as("SELECT status, escrow_status FROM jobs WHERE id=$1")
        .bind(job_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "completed");
    assert_eq!(escrow, "released");

    let txs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE job_id=$1 AND tx_type='pay_milestone'")
        .bind(job_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(txs, 2);

    // Double pay conflicts.
    let res = app
        .oneshot(post_json(&format!("/api/milestones/{m2}/pay"), &ctoken, json!({"tx_hash": "0xabc4"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

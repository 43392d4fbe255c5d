use axum::body::Body;
use axum::http::{Request, StatusCode};
use opengig_api::test_support::{self, seed_user, token_for};
use opengig_api::build_router;
use serde_json::json;
use tower::util::ServiceExt;

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

fn get_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
#[serial_test::serial]
async fn create_job_with_milestones() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000c1", "client").await;
    let token = token_for(&client);

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/jobs",
            &token,
            json!({
                "title": "Build a landing page",
                "description": "Next.js landing page with wallet connect",
                "category": "web",
                "milestones": [
                    {"title": "Design", "amount": 400},
                    {"title": "Implementation", "amount": 600}
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let v = body_json(res).await;
    assert_eq!(v["budget"], json!(1000));
    assert_eq!(v["status"], json!("open"));
    assert_eq!(v["escrow_status"], json!("unfunded"));
    assert_eq!(v["milestones"].as_array().unwrap().len(), 2);
    assert_eq!(v["milestones"][0]["position"], json!(0));
}

#[tokio::test]
#[serial_test::serial]
async fn create_job_requires_milestones() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000c2", "client").await;
    let token = token_for(&client);
    let res = app
        .oneshot(post_json(
            "/api/jobs",
            &token,
            json!({"title": "Empty", "description": "no milestones", "milestones": []}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[serial_test::serial]
async fn list_jobs_filters_by_status() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000c3", "client").await;
    let token = token_for(&client);
    sqlx::query("INSERT INTO jobs (client_id, title, description, budget, status) VALUES ($1,'a','d',10,'open'),($1,'b','d',20,'completed')")
        .bind(client.id)
        .execute(&pool)
        .await
        .unwrap();

    let res = app.clone().oneshot(get_auth("/api/jobs?status=open", &token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v.as_array().unwrap().len(), 1);
    assert_eq!(v[0]["title"], json!("a"));

    let res = app.clone().oneshot(get_auth("/api/jobs", &token)).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v.as_array().unwrap().len(), 2);
}

#[tokio::test]
#[serial_test::serial]
async fn only_client_can_edit_and_only_while_open() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000c4", "client").await;
    let other = seed_user(&pool, "0x00000000000000000000000000000000000000c5", "freelancer").await;
    let job_id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO jobs (client_id, title, description, budget) VALUES ($1,'t','d',100) RETURNING id",
    )
    .bind(client.id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let req = Request::builder()
        .method("PUT")
        .uri(format!("/api/jobs/{job_id}"))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token_for(&other)))
        .body(Body::from(json!({"title": "hijacked"}).to_string()))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    sqlx::query("UPDATE jobs SET status='assigned' WHERE id=$1").bind(job_id).execute(&pool).await.unwrap();
    let req = Request::builder()
        .method("PUT")
        .uri(format!("/api/jobs/{job_id}"))
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", token_for(&client)))
        .body(Body::from(json!({"title": "late edit"}).to_string()))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[serial_test::serial]
async fn cancel_requires_open_and_unfunded() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000c6", "client").await;
    let token = token_for(&client);
    let job_id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO jobs (client_id, title, description, budget, escrow_status) VALUES ($1,'t','d',100,'funded') RETURNING id",
    )
    .bind(client.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    let req = Request::builder()
        .method("DELETE")
        .uri(format!("/api/jobs/{job_id}"))
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[serial_test::serial]
async fn link_chain_mirrors_escrow() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000c7", "client").await;
    let freelancer = seed_user(&pool, "0x00000000000000000000000000000000000000c8", "freelancer").await;
    let token = token_for(&client);
    let job_id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO jobs (client_id, freelancer_id, title, description, budget, status) VALUES ($1,$2,'t','d',100,'assigned') RETURNING id",
    )
    .bind(client.id)
    .bind(freelancer.id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let res = app
        .clone()
        .oneshot(post_json(
            &format!("/api/jobs/{job_id}/chain"),
            &token,
            json!({"contract_job_id": 42, "tx_hash": "0xfeed01"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["contract_job_id"], json!(42));
    assert_eq!(v["escrow_status"], json!("funded"));

    // Audit log row recorded for the funding transaction.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE job_id=$1 AND tx_type='fund_escrow'")
        .bind(job_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);

    // Linking twice conflicts.
    let res = app
        .clone()
        .oneshot(post_json(
            &format!("/api/jobs/{job_id}/chain"),
            &token,
            json!({"contract_job_id": 43, "tx_hash": "0xfeed02"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[serial_test::serial]
async fn get_job_includes_milestones() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x00000000000000000000000000000000000000c9", "client").await;
    let token = token_for(&client);
    let job_id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO jobs (client_id, title, description, budget) VALUES ($1,'t','d',100) RETURNING id",
    )
    .bind(client.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO milestones (job_id, position, title, amount) VALUES ($1,0,'m1',100)")
        .bind(job_id)
        .execute(&pool)
        .await
        .unwrap();
    let res = app.oneshot(get_auth(&format!("/api/jobs/{job_id}"), &token)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["milestones"].as_array().unwrap().len(), 1);
}

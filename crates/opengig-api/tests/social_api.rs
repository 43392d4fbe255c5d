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

fn get_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn seed_job(pool: &Pool<Postgres>, client_id: Uuid, freelancer_id: Uuid, status: &str) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO jobs (client_id, freelancer_id, title, description, budget, status) VALUES ($1,$2,'job','d',100,$3) RETURNING id",
    )
    .bind(client_id)
    .bind(freelancer_id)
    .bind(status)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[tokio::test]
#[serial_test::serial]
async fn messages_flow_and_read_marking() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x0000000000000000000000000000000000000101", "client").await;
    let freelancer = seed_user(&pool, "0x0000000000000000000000000000000000000102", "freelancer").await;
    let outsider = seed_user(&pool, "0x0000000000000000000000000000000000000103", "client").await;
    let job_id = seed_job(&pool, client.id, freelancer.id, "in_progress").await;

    let res = app
        .clone()
        .oneshot(post_json("/api/messages", &token_for(&client), json!({"job_id": job_id, "body": "how is it going?"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app
        .clone()
        .oneshot(post_json("/api/messages", &token_for(&outsider), json!({"job_id": job_id, "body": "let me in"})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Freelancer reads the conversation; their incoming message flips to read.
    let res = app
        .clone()
        .oneshot(get_auth(&format!("/api/messages/job/{job_id}"), &token_for(&freelancer)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v.as_array().unwrap().len(), 1);
    let unread: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE recipient_id=$1 AND NOT read")
        .bind(freelancer.id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(unread, 0);
}

#[tokio::test]
#[serial_test::serial]
async fn notifications_mark_read() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let user = seed_user(&pool, "0x0000000000000000000000000000000000000104", "freelancer").await;
    let token = token_for(&user);
    sqlx::query("INSERT INTO notifications (user_id, kind, body) VALUES ($1,'test','one'),($1,'test','two')")
        .bind(user.id)
        .execute(&pool)
        .await
        .unwrap();

    let res = app.clone().oneshot(get_auth("/api/notifications?unread=true", &token)).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v.as_array().unwrap().len(), 2);
    let first_id = v[0]["id"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(post_json(&format!("/api/notifications/{first_id}/read"), &token, json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.clone().oneshot(post_json("/api/notifications/read-all", &token, json!({}))).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v["updated"], json!(1));

    let res = app.oneshot(get_auth("/api/notifications?unread=true", &token)).await.unwrap();
    assert_eq!(body_json(res).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
#[serial_test::serial]
async fn notifications_are_private() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let a = seed_user(&pool, "0x0000000000000000000000000000000000000105", "client").await;
    let b = seed_user(&pool, "0x0000000000000000000000000000000000000106", "client").await;
    sqlx::query("INSERT INTO notifications (user_id, kind, body) VALUES ($1,'test','secret')")
        .bind(a.id)
        .execute(&pool)
        .await
        .unwrap();
    let res = app.oneshot(get_auth("/api/notifications", &token_for(&b))).await.unwrap();
    assert_eq!(body_json(res).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
#[serial_test::serial]
async fn review_after_completion_only_and_once() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x0000000000000000000000000000000000000107", "client").await;
    let freelancer = seed_user(&pool, "0x0000000000000000000000000000000000000108", "freelancer").await;
    let active = seed_job(&pool, client.id, freelancer.id, "in_progress").await;
    let done = seed_job(&pool, client.id, freelancer.id, "completed").await;

    let res = app
        .clone()
        .oneshot(post_json("/api/reviews", &token_for(&client), json!({"job_id": active, "rating": 5})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/reviews",
            &token_for(&client),
            json!({"job_id": done, "rating": 4, "comment": "solid work"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    // One review per job per reviewer.
    let res = app
        .clone()
        .oneshot(post_json("/api/reviews", &token_for(&client), json!({"job_id": done, "rating": 1})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Counterparty reviews back.
    let res = app
        .clone()
        .oneshot(post_json("/api/reviews", &token_for(&freelancer), json!({"job_id": done, "rating": 5})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app
        .oneshot(get_auth(&format!("/api/reviews/user/{}", freelancer.wallet_address), &token_for(&client)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["count"], json!(1));
    assert_eq!(v["average_rating"], json!(4.0));
    assert_eq!(v["reviews"][0]["rating"], json!(4));
}

#[tokio::test]
#[serial_test::serial]
async fn rating_bounds_are_validated() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let client = seed_user(&pool, "0x0000000000000000000000000000000000000109", "client").await;
    let freelancer = seed_user(&pool, "0x000000000000000000000000000000000000010a", "freelancer").await;
    let done = seed_job(&pool, client.id, freelancer.id, "completed").await;
    let res = app
        .oneshot(post_json("/api/reviews", &token_for(&client), json!({"job_id": done, "rating": 6})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

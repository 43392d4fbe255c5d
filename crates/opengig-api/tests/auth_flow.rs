use axum::body::Body;
use axum::http::{Request, StatusCode};
use opengig_api::test_support::{self, TestWallet};
use opengig_api::build_router;
use serde_json::json;
use tower::util::ServiceExt;

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(res.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
#[serial_test::serial]
async fn nonce_sign_verify_roundtrip() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let wallet = TestWallet::new(7);

    let res = app
        .clone()
        .oneshot(post_json("/api/auth/nonce", json!({"wallet_address": wallet.address})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    let message = v["message"].as_str().unwrap().to_string();
    assert!(message.contains(v["nonce"].as_str().unwrap()));

    let signature = wallet.sign(&message);
    let res = app
        .clone()
        .oneshot(post_json(
            "/api/auth/verify",
            json!({"wallet_address": wallet.address, "signature": signature}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    let token = v["token"].as_str().unwrap().to_string();
    assert_eq!(v["user"]["wallet_address"], json!(wallet.address));

    // The minted token works against a protected route.
    let res = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/users/me")
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let me = body_json(res).await;
    assert_eq!(me["wallet_address"], json!(wallet.address));

    // Nonce is single use: replaying the same signature fails.
    let res = app
        .clone()
        .oneshot(post_json(
            "/api/auth/verify",
            json!({"wallet_address": wallet.address, "signature": wallet.sign(&message)}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    drop(pool);
}

#[tokio::test]
#[serial_test::serial]
async fn verify_rejects_wrong_signer() {
    let state = test_support::test_state().await;
    let app = build_router(state);
    let wallet = TestWallet::new(9);
    let intruder = TestWallet::new(10);

    let res = app
        .clone()
        .oneshot(post_json("/api/auth/nonce", json!({"wallet_address": wallet.address})))
        .await
        .unwrap();
    let v = body_json(res).await;
    let message = v["message"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/auth/verify",
            json!({"wallet_address": wallet.address, "signature": intruder.sign(&message)}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial_test::serial]
async fn verify_rejects_expired_nonce() {
    let state = test_support::test_state().await;
    let pool = state.db.clone();
    let app = build_router(state);
    let wallet = TestWallet::new(11);

    let res = app
        .clone()
        .oneshot(post_json("/api/auth/nonce", json!({"wallet_address": wallet.address})))
        .await
        .unwrap();
    let v = body_json(res).await;
    let message = v["message"].as_str().unwrap().to_string();

    sqlx::query("UPDATE auth_nonces SET created_at = now() - interval '1 hour' WHERE wallet_address=$1")
        .bind(&wallet.address)
        .execute(&pool)
        .await
        .unwrap();

    let res = app
        .clone()
        .oneshot(post_json(
            "/api/auth/verify",
            json!({"wallet_address": wallet.address, "signature": wallet.sign(&message)}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[serial_test::serial]
async fn verify_without_nonce_fails() {
    let state = test_support::test_state().await;
    let app = build_router(state);
    let wallet = TestWallet::new(12);
    let res = app
        .oneshot(post_json(
            "/api/auth/verify",
            json!({"wallet_address": wallet.address, "signature": wallet.sign("anything")}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

//! Checkout over HTTP: pricing, idempotent replay, validation, rate limiting.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;

use marketplace_api::services::signing::ResponseSigner;
use marketplace_integration_tests::{TEST_SIGNING_SECRET, TestApp, money, test_config};

async fn app_with_cart(user: i32) -> TestApp {
    let mut app = TestApp::new();
    app.sign_in(user).await;
    let a = app.seed_product("lamp", 500).await;
    let b = app.seed_product("throw", 300).await;
    assert_eq!(app.add_to_cart(a, 2).await.status, StatusCode::OK);
    assert_eq!(app.add_to_cart(b, 1).await.status, StatusCode::OK);
    app
}

#[tokio::test]
async fn test_checkout_creates_priced_order() {
    let app = app_with_cart(1).await;

    let response = app.checkout("order-1").await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert!(response.header("x-idempotent").is_none());

    let body = response.json();
    assert_eq!(money(&body["subtotal"]), Decimal::from(1300));
    assert_eq!(money(&body["platformFee"]), Decimal::from(22));
    assert_eq!(money(&body["total"]), Decimal::from(1322));
    assert_eq!(body["currency"], "INR");
    assert!(body["orderNumber"].as_str().unwrap().starts_with("RE-"));

    let items = body["lineItems"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], "lamp");
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(money(&items[0]["subtotal"]), Decimal::from(1000));

    // Cart is emptied by a successful checkout.
    let cart = app.get("/cart").await.json();
    assert!(cart["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_response_signature_verifies() {
    let app = app_with_cart(1).await;
    let response = app.checkout("signed").await;

    let signer = ResponseSigner::new(TEST_SIGNING_SECRET.to_string().into());
    let signature = response.header("x-signature").unwrap();
    assert!(signer.verify(&response.body, signature));
}

#[tokio::test]
async fn test_retry_replays_identical_response() {
    let app = app_with_cart(1).await;

    let first = app.checkout("retry-me").await;
    let second = app.checkout("retry-me").await;

    assert_eq!(first.status, StatusCode::CREATED);
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.header("x-idempotent"), Some("true"));
    assert_eq!(first.body, second.body);
    assert_eq!(first.header("x-signature"), second.header("x-signature"));

    let orders = app.get("/orders").await.json();
    assert_eq!(orders["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_retries_create_one_order() {
    let app = app_with_cart(1).await;

    let (a, b) = tokio::join!(app.checkout("parallel"), app.checkout("parallel"));
    assert!(a.status.is_success());
    assert!(b.status.is_success());
    assert_eq!(a.body, b.body);

    let orders = app.get("/orders").await.json();
    assert_eq!(orders["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_keys_are_scoped_per_user() {
    let mut app = app_with_cart(1).await;
    let first = app.checkout("shared-key").await.json();

    app.sign_in(2).await;
    let product = app.seed_product("atlas", 450).await;
    app.add_to_cart(product, 1).await;
    let second = app.checkout("shared-key").await;

    assert_eq!(second.status, StatusCode::CREATED);
    assert_ne!(second.json()["orderId"], first["orderId"]);
}

#[tokio::test]
async fn test_new_key_after_checkout_sees_empty_cart() {
    let app = app_with_cart(1).await;
    app.checkout("first").await;

    let response = app.checkout("second").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["message"], "Cart empty");
}

#[tokio::test]
async fn test_missing_key_is_rejected() {
    let app = app_with_cart(1).await;
    let response = app
        .request(
            Method::POST,
            "/checkout",
            &[],
            Some(&json!({ "shippingAddress": { "line1": "1 Main St" } })),
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["message"], "Idempotency-Key header required");

    // Nothing was bought.
    let cart = app.get("/cart").await.json();
    assert_eq!(cart["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_missing_shipping_address_is_rejected() {
    let app = app_with_cart(1).await;
    let response = app
        .request(Method::POST, "/checkout", &[("idempotency-key", "k")], None)
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["message"], "Shipping address required");
}

#[tokio::test]
async fn test_checkout_requires_session() {
    let app = TestApp::new();
    let response = app.checkout("anon").await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["message"], "Authentication required");
}

#[tokio::test]
async fn test_checkout_is_rate_limited_per_client() {
    let mut app = TestApp::new();
    app.sign_in(1).await;

    // Default burst is 7; empty-cart rejections still count.
    for i in 0..7 {
        let response = app.checkout(&format!("k{i}")).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "request {i}");
    }
    let limited = app.checkout("k7").await;
    assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(limited.json()["message"], "Too many requests");

    // Other endpoints and other clients are unaffected.
    assert_eq!(app.get("/cart").await.status, StatusCode::OK);
    app.set_client_ip("203.0.113.50");
    assert_eq!(app.checkout("k8").await.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_price_change_after_checkout_leaves_order_alone() {
    let mut config = test_config();
    config.checkout.rate_limit_burst = 50;
    let mut app = TestApp::with_config(config);
    app.sign_in(1).await;
    let lamp = app.seed_product("lamp", 500).await;
    app.add_to_cart(lamp, 1).await;

    let receipt = app.checkout("before-change").await.json();

    // Re-listing at a new price does not touch the stored order.
    let relisted = app.seed_product("lamp", 900).await;
    app.add_to_cart(relisted, 1).await;
    let next = app.checkout("after-change").await.json();

    let order_id = receipt["orderId"].as_i64().unwrap();
    let order = app.get(&format!("/orders/{order_id}")).await.json();
    assert_eq!(money(&order["lineItems"][0]["unitPrice"]), Decimal::from(500));
    assert_eq!(money(&next["subtotal"]), Decimal::from(900));
}

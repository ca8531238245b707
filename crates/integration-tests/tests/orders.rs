//! Order history, detail, ownership and cancellation over HTTP.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::HashSet;

use axum::http::StatusCode;
use serde_json::{Value, json};

use marketplace_core::OrderStatus;
use marketplace_integration_tests::{TestApp, test_config};

/// App whose user 1 has placed `count` orders.
async fn app_with_orders(count: usize) -> (TestApp, Vec<Value>) {
    let mut config = test_config();
    config.checkout.rate_limit_burst = 100;
    let mut app = TestApp::with_config(config);
    app.sign_in(1).await;
    let product = app.seed_product("mug", 250).await;

    let mut receipts = Vec::with_capacity(count);
    for i in 0..count {
        app.add_to_cart(product, 1).await;
        let response = app.checkout(&format!("order-{i}")).await;
        assert_eq!(response.status, StatusCode::CREATED);
        receipts.push(response.json());
    }
    (app, receipts)
}

#[tokio::test]
async fn test_history_pages_newest_first_without_gaps() {
    let (app, receipts) = app_with_orders(12).await;

    let first = app.get("/orders?limit=5").await;
    assert_eq!(first.status, StatusCode::OK);
    let first = first.json();
    assert_eq!(first["items"].as_array().unwrap().len(), 5);
    assert_eq!(first["items"][0]["id"], receipts[11]["orderId"]);

    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let uri = match &cursor {
            Some(c) => format!("/orders?limit=5&cursor={}", c.replace('+', "%2B")),
            None => "/orders?limit=5".to_string(),
        };
        let page = app.get(&uri).await.json();
        for item in page["items"].as_array().unwrap() {
            seen.push(item["id"].as_i64().unwrap());
        }
        match page["nextCursor"].as_str() {
            Some(next) => cursor = Some(next.to_string()),
            None => break,
        }
    }

    assert_eq!(seen.len(), 12);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 12);
    let mut expected: Vec<i64> = receipts
        .iter()
        .map(|r| r["orderId"].as_i64().unwrap())
        .collect();
    expected.reverse();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_limit_is_clamped() {
    let (app, _) = app_with_orders(3).await;

    let page = app.get("/orders?limit=0").await.json();
    assert_eq!(page["items"].as_array().unwrap().len(), 1);

    let page = app.get("/orders?limit=abc").await.json();
    assert_eq!(page["items"].as_array().unwrap().len(), 3);
    assert!(page["nextCursor"].is_null());
}

#[tokio::test]
async fn test_invalid_cursor_is_bad_request() {
    let (app, _) = app_with_orders(1).await;
    let response = app.get("/orders?cursor=yesterday").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["message"], "Invalid cursor");
}

#[tokio::test]
async fn test_detail_is_owner_only() {
    let (mut app, receipts) = app_with_orders(1).await;
    let id = receipts[0]["orderId"].as_i64().unwrap();

    let order = app.get(&format!("/orders/{id}")).await;
    assert_eq!(order.status, StatusCode::OK);
    let order = order.json();
    assert_eq!(order["status"], "Pending");
    assert_eq!(order["timeline"].as_array().unwrap().len(), 1);
    assert!(order.get("idempotencyKey").is_none());

    app.sign_in(2).await;
    assert_eq!(
        app.get(&format!("/orders/{id}")).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.get("/orders/99999").await.status, StatusCode::NOT_FOUND);

    app.sign_out();
    assert_eq!(
        app.get(&format!("/orders/{id}")).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn test_cancel_then_cancel_again_conflicts() {
    let (app, receipts) = app_with_orders(1).await;
    let id = receipts[0]["orderId"].as_i64().unwrap();
    let uri = format!("/orders/{id}/cancel");

    let response = app.post(&uri, &json!({})).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["message"], "Order cancelled");
    assert_eq!(body["order"]["status"], "Cancelled");
    assert!(body["order"]["cancelledAt"].is_string());
    assert_eq!(body["order"]["timeline"][1]["note"], "User cancelled");

    let again = app.post(&uri, &json!({})).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.json()["message"], "Order not cancellable");
}

#[tokio::test]
async fn test_shipped_order_cannot_be_cancelled() {
    let (app, receipts) = app_with_orders(1).await;
    let number = receipts[0]["orderNumber"].as_str().unwrap();
    let ledger = app.state().ledger();
    ledger
        .transition_by_number(number, OrderStatus::Processing, None)
        .await
        .unwrap();
    ledger
        .transition_by_number(number, OrderStatus::Shipped, Some("AWB 42".to_string()))
        .await
        .unwrap();

    let id = receipts[0]["orderId"].as_i64().unwrap();
    let response = app.post(&format!("/orders/{id}/cancel"), &json!({})).await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let order = app.get(&format!("/orders/{id}")).await.json();
    assert_eq!(order["status"], "Shipped");
    assert!(order["cancelledAt"].is_null());
}

#[tokio::test]
async fn test_other_user_cannot_cancel() {
    let (mut app, receipts) = app_with_orders(1).await;
    let id = receipts[0]["orderId"].as_i64().unwrap();

    app.sign_in(2).await;
    let response = app.post(&format!("/orders/{id}/cancel"), &json!({})).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();
    let health = app.get("/health").await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.text(), "ok");
    assert!(health.header("x-request-id").is_some());
    assert_eq!(app.get("/health/ready").await.status, StatusCode::OK);
}

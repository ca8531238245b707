//! Integration test harness for the marketplace API.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests over the in-memory backend
//! cargo test -p marketplace-integration-tests
//!
//! # Also run the PostgreSQL tests
//! MARKETPLACE_DATABASE_URL=postgres://... cargo test -p marketplace-integration-tests -- --ignored
//! ```
//!
//! [`TestApp`] builds the real router over in-memory stores and drives it
//! with `tower::ServiceExt::oneshot`. Signing in goes through the
//! `/dev/session` route and the session cookie is carried by hand.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used, clippy::expect_used)]

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;

use marketplace_api::app::build_router;
use marketplace_api::config::ApiConfig;
use marketplace_api::db::NewProduct;
use marketplace_api::state::AppState;
use marketplace_core::{ProductCondition, ProductId, UserId};

/// Signing secret used by every test app.
pub const TEST_SIGNING_SECRET: &str = "integration-test-signing-secret-9f3a";

/// Largest response body a test will read.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Default configuration for in-memory tests.
#[must_use]
pub fn test_config() -> ApiConfig {
    ApiConfig::in_memory(SecretString::from(TEST_SIGNING_SECRET))
}

/// A router plus the client-side state a browser would keep.
pub struct TestApp {
    router: Router,
    state: AppState,
    cookie: Option<String>,
    client_ip: String,
}

/// A buffered response.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Body parsed as JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    /// Body as UTF-8.
    #[must_use]
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.body).expect("response body is UTF-8")
    }

    /// A header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    /// App with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// App with a customized configuration.
    #[must_use]
    pub fn with_config(config: ApiConfig) -> Self {
        let state = AppState::in_memory(config).expect("valid test configuration");
        Self {
            router: build_router(state.clone()),
            state,
            cookie: None,
            client_ip: "198.51.100.7".to_string(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Send a request as this client.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<&Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", &self.client_ip);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(json).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), MAX_BODY_BYTES)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, &[], None).await
    }

    pub async fn post(&self, uri: &str, body: &Value) -> TestResponse {
        self.request(Method::POST, uri, &[], Some(body)).await
    }

    /// `POST /checkout` with an idempotency key and a shipping address.
    pub async fn checkout(&self, key: &str) -> TestResponse {
        self.request(
            Method::POST,
            "/checkout",
            &[("idempotency-key", key)],
            Some(&serde_json::json!({
                "shippingAddress": { "line1": "221B Baker Street", "city": "Pune" }
            })),
        )
        .await
    }

    /// Sign in as `user_id`, keeping the session cookie.
    pub async fn sign_in(&mut self, user_id: i32) {
        self.cookie = None;
        let response = self
            .post("/dev/session", &serde_json::json!({ "userId": user_id }))
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        let cookie = response
            .header("set-cookie")
            .and_then(|c| c.split(';').next())
            .expect("session cookie")
            .to_string();
        self.cookie = Some(cookie);
    }

    /// Forget the session cookie.
    pub fn sign_out(&mut self) {
        self.cookie = None;
    }

    /// Pretend to be a different client address.
    pub fn set_client_ip(&mut self, ip: &str) {
        ip.clone_into(&mut self.client_ip);
    }

    /// Insert an active product and return its id.
    pub async fn seed_product(&self, name: &str, price: i64) -> ProductId {
        self.state
            .stores()
            .catalog
            .insert_product(NewProduct {
                seller_id: UserId::new(900),
                name: name.to_string(),
                description: String::new(),
                price: Decimal::from(price),
                category: "test".to_string(),
                condition: ProductCondition::New,
                images: vec![format!("https://img.example/{name}.jpg")],
                stock: 10,
            })
            .await
            .unwrap()
            .id
    }

    /// Put `quantity` of `product_id` into the signed-in user's cart.
    pub async fn add_to_cart(&self, product_id: ProductId, quantity: i32) -> TestResponse {
        self.post(
            "/cart",
            &serde_json::json!({ "productId": product_id, "quantity": quantity }),
        )
        .await
    }
}

/// Parse a money value serialized as a string.
#[must_use]
pub fn money(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("money is serialized as a string")
        .parse()
        .expect("money parses as a decimal")
}

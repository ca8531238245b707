//! HTTP route handlers for the API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                 - Liveness
//! GET    /health/ready           - Readiness (database reachable)
//!
//! # Checkout (requires auth, rate limited)
//! POST   /checkout               - Place an order from the cart (Idempotency-Key)
//!
//! # Orders (requires auth)
//! GET    /orders                 - Order history (?cursor=&limit=)
//! GET    /orders/{id}            - Order detail (owner only)
//! POST   /orders/{id}/cancel     - Cancel (owner only)
//!
//! # Cart (requires auth)
//! GET    /cart                   - Cart with current prices
//! POST   /cart                   - Set a line {productId, quantity}
//! PUT    /cart/{product_id}      - Change a line {quantity}
//! DELETE /cart/{product_id}      - Remove a line
//!
//! # Catalog
//! GET    /products               - Active products (?cursor=&limit=)
//! GET    /products/{id}          - Product detail
//!
//! # In-memory backend only
//! POST   /dev/session            - Sign in as {userId}
//! DELETE /dev/session            - Sign out
//! ```

pub mod cart;
pub mod checkout;
pub mod dev;
pub mod orders;
pub mod products;

use axum::{
    Router,
    routing::{get, post, put},
};
use serde::Deserialize;

use crate::state::AppState;

/// `?cursor=&limit=` for paginated lists.
///
/// `limit` is taken leniently: anything that is not an integer falls back to
/// the default page size.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    #[must_use]
    pub fn limit(&self) -> Option<i64> {
        self.limit.as_deref().and_then(|l| l.trim().parse().ok())
    }
}

/// Checkout routes. Rate limiting is layered on by the caller.
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/checkout", post(checkout::checkout))
}

/// Order, cart and catalog routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(orders::list))
        .route("/orders/{id}", get(orders::detail))
        .route("/orders/{id}/cancel", post(orders::cancel))
        .route("/cart", get(cart::view).post(cart::add))
        .route("/cart/{product_id}", put(cart::update).delete(cart::remove))
        .route("/products", get(products::list))
        .route("/products/{id}", get(products::detail))
}

/// Session helpers for the in-memory backend.
pub fn dev_routes() -> Router<AppState> {
    Router::new().route("/dev/session", post(dev::sign_in).delete(dev::sign_out))
}

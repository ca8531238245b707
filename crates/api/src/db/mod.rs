//! Storage for products, carts, orders and idempotency records.
//!
//! # Schema: `marketplace`
//!
//! ## Tables
//!
//! - `product` - Catalog listings with their current price
//! - `cart` / `cart_line` - One cart per user, lines in insertion order
//! - `order` - Immutable order records with JSONB line item snapshots and
//!   timeline; unique `order_number` and unique `(user_id, idempotency_key)`
//! - `idempotency_record` - Cached checkout responses, swept after the TTL
//! - `tower_sessions.session` - Sessions written by the auth service
//!
//! # Backends
//!
//! Every store is a trait with a `PostgreSQL` implementation and an
//! in-memory one. The in-memory backend serves a single process and is used
//! by tests and local demos.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/api/migrations/` and run via:
//! ```bash
//! cargo run -p marketplace-cli -- migrate
//! ```

pub mod carts;
pub mod idempotency;
pub mod memory;
pub mod orders;
pub mod products;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use marketplace_core::cart::Cart;
use marketplace_core::order::{NewOrder, Order, Transition};
use marketplace_core::pagination::{Cursor, PageLimit};
use marketplace_core::{OrderId, Product, ProductCondition, ProductId, UserId};

pub use carts::PgCartStore;
pub use idempotency::PgIdempotencyStore;
pub use memory::MemoryStore;
pub use orders::PgOrderStore;
pub use products::PgCatalogStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation or lost race on a conditional update.
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// Generated order number already taken. Retry with a fresh one.
    #[error("order number already exists")]
    DuplicateOrderNumber,

    /// An order already exists for this user and idempotency key.
    #[error("order already exists for idempotency key")]
    DuplicateIdempotencyKey,
}

/// A product listing to insert.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub seller_id: UserId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub condition: ProductCondition,
    pub images: Vec<String>,
    pub stock: i32,
}

/// Result of writing an order together with the cart clear.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: Order,
    /// `false` if the order is durable but the cart could not be cleared.
    pub cart_cleared: bool,
}

/// Read access to the product catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Get one product regardless of status.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Resolve many products at once. Missing ids are simply absent.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Active products, newest first, `limit.fetch_count()` rows at most.
    async fn list_active(
        &self,
        cursor: Option<Cursor>,
        limit: PageLimit,
    ) -> Result<Vec<Product>, RepositoryError>;

    /// Insert a listing (seeding and tests).
    async fn insert_product(&self, product: NewProduct) -> Result<Product, RepositoryError>;
}

/// Per-user carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// The user's cart, if one was ever created.
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError>;

    /// Set a line's quantity, creating the cart if needed.
    /// A quantity of zero or less removes the line.
    async fn set_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, RepositoryError>;

    /// Change an existing line.
    ///
    /// Returns `RepositoryError::NotFound` if the cart or line does not exist.
    async fn update_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, RepositoryError>;

    /// Remove a line. Returns `RepositoryError::NotFound` if there is no cart.
    async fn remove_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Cart, RepositoryError>;
}

/// Durable orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist an order and clear the owner's cart as one unit.
    ///
    /// The cart is never cleared unless the order is written. A failed clear
    /// does not undo the order; it is reported through
    /// [`CreatedOrder::cart_cleared`].
    ///
    /// # Errors
    ///
    /// `DuplicateOrderNumber` and `DuplicateIdempotencyKey` signal unique
    /// constraint violations the caller is expected to handle.
    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, RepositoryError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    async fn find_by_order_number(&self, number: &str) -> Result<Option<Order>, RepositoryError>;

    /// The order a user already placed with this idempotency key.
    async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders, newest first, `limit.fetch_count()` rows at most.
    async fn list_for_user(
        &self,
        user_id: UserId,
        cursor: Option<Cursor>,
        limit: PageLimit,
    ) -> Result<Vec<Order>, RepositoryError>;

    /// Apply a transition only if the order is still in `transition.from`.
    ///
    /// Returns `None` if the order is missing or its status already moved.
    async fn apply_transition(
        &self,
        id: OrderId,
        transition: &Transition,
    ) -> Result<Option<Order>, RepositoryError>;
}

/// The three domain stores behind one backend.
#[derive(Clone)]
pub struct Stores {
    pub catalog: Arc<dyn CatalogStore>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    /// Stores backed by `PostgreSQL`.
    #[must_use]
    pub fn postgres(pool: &PgPool) -> Self {
        Self {
            catalog: Arc::new(PgCatalogStore::new(pool.clone())),
            carts: Arc::new(PgCartStore::new(pool.clone())),
            orders: Arc::new(PgOrderStore::new(pool.clone())),
        }
    }

    /// Stores sharing one in-memory backend.
    #[must_use]
    pub fn memory(store: &Arc<MemoryStore>) -> Self {
        Self {
            catalog: store.clone(),
            carts: store.clone(),
            orders: store.clone(),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Name of the unique constraint violated by `err`, if any.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    if let sqlx::Error::Database(db_err) = err
        && db_err.is_unique_violation()
    {
        return Some(db_err.constraint().unwrap_or_default().to_owned());
    }
    None
}

//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use marketplace_core::pricing::{PricingEngine, PricingError};

use crate::config::ApiConfig;
use crate::db::{MemoryStore, PgIdempotencyStore, Stores};
use crate::events::EventBus;
use crate::services::checkout::CheckoutService;
use crate::services::idempotency::{IdempotencyCache, IdempotencyStore, MokaIdempotencyStore};
use crate::services::ledger::OrderLedger;
use crate::services::signing::ResponseSigner;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like stores, services and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ApiConfig,
    pool: Option<PgPool>,
    stores: Stores,
    events: EventBus,
    ledger: Arc<OrderLedger>,
    idempotency: IdempotencyCache,
    checkout: CheckoutService,
}

impl AppState {
    /// Wire services over the given stores.
    ///
    /// # Arguments
    ///
    /// * `config` - API configuration
    /// * `pool` - `PostgreSQL` pool, used for readiness checks when present
    /// * `stores` - Catalog, cart and order stores
    /// * `idempotency_store` - Backend for cached checkout responses
    ///
    /// # Errors
    ///
    /// Returns an error if the pricing configuration is invalid.
    pub fn new(
        config: ApiConfig,
        pool: Option<PgPool>,
        stores: Stores,
        idempotency_store: Arc<dyn IdempotencyStore>,
    ) -> Result<Self, PricingError> {
        let pricing = PricingEngine::new(config.pricing)?;
        let events = EventBus::new();
        let ledger = Arc::new(OrderLedger::new(
            stores.orders.clone(),
            pricing,
            events.clone(),
        ));
        let idempotency = IdempotencyCache::new(
            idempotency_store,
            ResponseSigner::new(config.signing_secret.clone()),
            config.idempotency.ttl,
        );
        let checkout = CheckoutService::new(
            stores.catalog.clone(),
            stores.carts.clone(),
            ledger.clone(),
            idempotency.clone(),
            config.currency,
            config.checkout.timeout,
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                stores,
                events,
                ledger,
                idempotency,
                checkout,
            }),
        })
    }

    /// State backed by `PostgreSQL` for every store.
    ///
    /// # Errors
    ///
    /// Returns an error if the pricing configuration is invalid.
    pub fn postgres(config: ApiConfig, pool: PgPool) -> Result<Self, PricingError> {
        let stores = Stores::postgres(&pool);
        let idempotency = Arc::new(PgIdempotencyStore::new(pool.clone()));
        Self::new(config, Some(pool), stores, idempotency)
    }

    /// Single-process state with in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns an error if the pricing configuration is invalid.
    pub fn in_memory(config: ApiConfig) -> Result<Self, PricingError> {
        let store = Arc::new(MemoryStore::new());
        let idempotency = Arc::new(MokaIdempotencyStore::new(config.idempotency.ttl));
        Self::new(config, None, Stores::memory(&store), idempotency)
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.inner.config
    }

    /// The `PostgreSQL` pool, absent for the in-memory backend.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    #[must_use]
    pub fn ledger(&self) -> &OrderLedger {
        &self.inner.ledger
    }

    #[must_use]
    pub fn idempotency(&self) -> &IdempotencyCache {
        &self.inner.idempotency
    }

    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }
}

//! Idempotency cache for checkout responses.
//!
//! A checkout response is cached under `(user, Idempotency-Key)` for a fixed
//! TTL and replayed byte-for-byte on retry. Writes are insert-if-absent: when
//! two requests race, both end up returning whichever response was stored
//! first.
//!
//! Two backends implement [`IdempotencyStore`]: [`MokaIdempotencyStore`] for
//! a single process and [`crate::db::PgIdempotencyStore`] for deployments with
//! more than one instance.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use thiserror::Error;
use tokio::task::JoinHandle;

use marketplace_core::UserId;

use crate::db::RepositoryError;
use crate::services::signing::ResponseSigner;

/// Request header carrying the client's key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Response header marking a replay.
pub const IDEMPOTENT_REPLAY_HEADER: &str = "x-idempotent";

/// Longest accepted key.
pub const MAX_KEY_LENGTH: usize = 255;

/// Upper bound on cached responses held by the in-memory backend.
const MAX_CACHED_RESPONSES: u64 = 100_000;

/// Idempotency failures.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("Idempotency-Key header required")]
    MissingKey,

    #[error("Invalid Idempotency-Key: {0}")]
    InvalidKey(&'static str),

    #[error("idempotency storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// A validated client-supplied key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate a raw header value.
    ///
    /// # Errors
    ///
    /// `MissingKey` for an absent or blank value, `InvalidKey` for one that
    /// is too long or contains non-printable characters.
    pub fn parse(raw: Option<&str>) -> Result<Self, IdempotencyError> {
        let value = raw.map(str::trim).unwrap_or_default();
        if value.is_empty() {
            return Err(IdempotencyError::MissingKey);
        }
        if value.len() > MAX_KEY_LENGTH {
            return Err(IdempotencyError::InvalidKey("too long"));
        }
        if !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(IdempotencyError::InvalidKey("must be printable ASCII"));
        }
        Ok(Self(value.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Keys are scoped per user so one caller can never replay another's response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyScope {
    pub user_id: UserId,
    pub key: IdempotencyKey,
}

/// A stored checkout response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Exact response body bytes, as sent the first time.
    pub body: String,
    /// Hex HMAC-SHA256 of `body`.
    pub signature: String,
    pub created_at: DateTime<Utc>,
}

impl CachedResponse {
    /// Whether the entry is still within its TTL at `now`.
    #[must_use]
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        (now - self.created_at).to_std().map_or(true, |age| age < ttl)
    }
}

/// Storage port for cached responses.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// A response stored within the last `ttl`.
    async fn lookup(
        &self,
        scope: &IdempotencyScope,
        ttl: Duration,
    ) -> Result<Option<CachedResponse>, RepositoryError>;

    /// Store `response` unless a fresh one exists; return whichever is stored.
    async fn insert_if_absent(
        &self,
        scope: &IdempotencyScope,
        response: CachedResponse,
        ttl: Duration,
    ) -> Result<CachedResponse, RepositoryError>;

    /// Remove records older than `ttl`, returning how many were removed.
    async fn cleanup_expired(&self, ttl: Duration) -> Result<u64, RepositoryError>;
}

/// Process-local store on a moka cache.
///
/// moka's entry API gives an atomic insert-if-absent, and its TTL evicts
/// entries even if the sweeper never runs.
pub struct MokaIdempotencyStore {
    cache: Cache<IdempotencyScope, CachedResponse>,
}

impl MokaIdempotencyStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_CACHED_RESPONSES)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl IdempotencyStore for MokaIdempotencyStore {
    async fn lookup(
        &self,
        scope: &IdempotencyScope,
        ttl: Duration,
    ) -> Result<Option<CachedResponse>, RepositoryError> {
        let now = Utc::now();
        Ok(self
            .cache
            .get(scope)
            .await
            .filter(|cached| cached.is_fresh(ttl, now)))
    }

    async fn insert_if_absent(
        &self,
        scope: &IdempotencyScope,
        response: CachedResponse,
        _ttl: Duration,
    ) -> Result<CachedResponse, RepositoryError> {
        Ok(self
            .cache
            .entry(scope.clone())
            .or_insert(response)
            .await
            .into_value())
    }

    async fn cleanup_expired(&self, ttl: Duration) -> Result<u64, RepositoryError> {
        let now = Utc::now();
        let expired: Vec<_> = self
            .cache
            .iter()
            .filter(|(_, cached)| !cached.is_fresh(ttl, now))
            .map(|(scope, _)| scope)
            .collect();
        for scope in &expired {
            self.cache.invalidate(scope.as_ref()).await;
        }
        self.cache.run_pending_tasks().await;
        Ok(expired.len() as u64)
    }
}

/// Signing cache in front of an [`IdempotencyStore`].
#[derive(Clone)]
pub struct IdempotencyCache {
    store: Arc<dyn IdempotencyStore>,
    signer: ResponseSigner,
    ttl: Duration,
}

impl IdempotencyCache {
    #[must_use]
    pub fn new(store: Arc<dyn IdempotencyStore>, signer: ResponseSigner, ttl: Duration) -> Self {
        Self { store, signer, ttl }
    }

    /// Fresh cached response for a scope.
    ///
    /// # Errors
    ///
    /// Returns `IdempotencyError::Storage` if the backend fails.
    pub async fn get(
        &self,
        scope: &IdempotencyScope,
    ) -> Result<Option<CachedResponse>, IdempotencyError> {
        Ok(self.store.lookup(scope, self.ttl).await?)
    }

    /// Sign and store a response body. If another request stored first, its
    /// response is returned instead.
    ///
    /// # Errors
    ///
    /// Returns `IdempotencyError::Storage` if the backend fails.
    pub async fn put(
        &self,
        scope: &IdempotencyScope,
        body: String,
    ) -> Result<CachedResponse, IdempotencyError> {
        let signature = self.signer.sign(body.as_bytes());
        let response = CachedResponse {
            body,
            signature,
            created_at: Utc::now(),
        };
        Ok(self
            .store
            .insert_if_absent(scope, response, self.ttl)
            .await?)
    }

    /// Remove expired entries once.
    ///
    /// # Errors
    ///
    /// Returns `IdempotencyError::Storage` if the backend fails.
    pub async fn sweep(&self) -> Result<u64, IdempotencyError> {
        Ok(self.store.cleanup_expired(self.ttl).await?)
    }

    /// Sweep expired entries every `interval` until the task is aborted.
    #[must_use]
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match cache.sweep().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Swept expired idempotency records"),
                    Err(e) => tracing::warn!(error = %e, "Idempotency sweep failed"),
                }
            }
        })
    }
}

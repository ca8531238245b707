//! Idempotency records in `PostgreSQL`.
//!
//! Shared by every API instance, so a retry routed to a different process
//! still replays. `INSERT … ON CONFLICT` makes the write insert-if-absent; a
//! conflicting row is only replaced once it has expired.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use sqlx::PgPool;

use crate::services::idempotency::{CachedResponse, IdempotencyScope, IdempotencyStore};

use super::RepositoryError;

#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    response_body: String,
    signature: String,
    created_at: DateTime<Utc>,
}

impl From<IdempotencyRow> for CachedResponse {
    fn from(row: IdempotencyRow) -> Self {
        Self {
            body: row.response_body,
            signature: row.signature,
            created_at: row.created_at,
        }
    }
}

/// `PostgreSQL` idempotency store.
#[derive(Clone)]
pub struct PgIdempotencyStore {
    pool: PgPool,
}

impl PgIdempotencyStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Records created at or before this instant have expired.
fn cutoff(ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[async_trait]
impl IdempotencyStore for PgIdempotencyStore {
    async fn lookup(
        &self,
        scope: &IdempotencyScope,
        ttl: Duration,
    ) -> Result<Option<CachedResponse>, RepositoryError> {
        let row = sqlx::query_as::<_, IdempotencyRow>(
            r"
            SELECT response_body, signature, created_at
            FROM marketplace.idempotency_record
            WHERE user_id = $1 AND key = $2 AND created_at > $3
            ",
        )
        .bind(scope.user_id)
        .bind(scope.key.as_str())
        .bind(cutoff(ttl))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CachedResponse::from))
    }

    async fn insert_if_absent(
        &self,
        scope: &IdempotencyScope,
        response: CachedResponse,
        ttl: Duration,
    ) -> Result<CachedResponse, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Records are never rewritten; an expired one is removed first.
        sqlx::query(
            r"
            DELETE FROM marketplace.idempotency_record
            WHERE user_id = $1 AND key = $2 AND created_at <= $3
            ",
        )
        .bind(scope.user_id)
        .bind(scope.key.as_str())
        .bind(cutoff(ttl))
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query_as::<_, IdempotencyRow>(
            r"
            INSERT INTO marketplace.idempotency_record
                (user_id, key, response_body, signature, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, key) DO NOTHING
            RETURNING response_body, signature, created_at
            ",
        )
        .bind(scope.user_id)
        .bind(scope.key.as_str())
        .bind(&response.body)
        .bind(&response.signature)
        .bind(response.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;

        if let Some(row) = inserted {
            return Ok(row.into());
        }

        // Lost the race: a fresh record already exists. Read the winner.
        Ok(self.lookup(scope, ttl).await?.unwrap_or(response))
    }

    async fn cleanup_expired(&self, ttl: Duration) -> Result<u64, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM marketplace.idempotency_record WHERE created_at <= $1")
                .bind(cutoff(ttl))
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

//! Idempotency record maintenance.
//!
//! The API sweeps expired records on its own; this command is for manual
//! cleanup, e.g. after the TTL was lowered.
//!
//! ```bash
//! mk-cli idempotency purge            # records older than IDEMPOTENCY_TTL_SECS
//! mk-cli idempotency purge --all      # every record
//! ```

use std::time::Duration;

use marketplace_api::db::PgIdempotencyStore;
use marketplace_api::services::idempotency::IdempotencyStore;

use super::{CommandError, connect};

const DEFAULT_TTL_SECS: u64 = 300;

fn ttl_from_env() -> Result<Duration, CommandError> {
    match std::env::var("IDEMPOTENCY_TTL_SECS") {
        Ok(value) => value
            .parse()
            .map(Duration::from_secs)
            .map_err(|_| CommandError::InvalidEnvVar("IDEMPOTENCY_TTL_SECS", value)),
        Err(_) => Ok(Duration::from_secs(DEFAULT_TTL_SECS)),
    }
}

/// Delete expired (or, with `all`, every) cached checkout response.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the delete fails.
pub async fn purge(all: bool) -> Result<(), CommandError> {
    let pool = connect().await?;
    let ttl = if all { Duration::ZERO } else { ttl_from_env()? };

    let removed = PgIdempotencyStore::new(pool).cleanup_expired(ttl).await?;
    tracing::info!(removed, "Idempotency records purged");
    Ok(())
}

//! Operator order transitions.
//!
//! # Usage
//!
//! ```bash
//! mk-cli orders transition RE-7K2M-Q9XD-4HNP processing
//! mk-cli orders transition RE-7K2M-Q9XD-4HNP shipped --note "Courier AWB 123"
//! ```

use std::sync::Arc;

use marketplace_api::db::PgOrderStore;
use marketplace_api::events::EventBus;
use marketplace_api::services::ledger::OrderLedger;
use marketplace_core::OrderStatus;
use marketplace_core::pricing::{PricingConfig, PricingEngine};

use super::{CommandError, connect};

/// Move an order to `status`, following the order state machine.
///
/// # Errors
///
/// Returns an error for an unknown status or order number, or a transition
/// the state machine does not allow.
pub async fn transition(
    order_number: &str,
    status: &str,
    note: Option<String>,
) -> Result<(), CommandError> {
    let to: OrderStatus = status
        .parse()
        .map_err(|_| CommandError::InvalidArgument(format!("unknown status: {status}")))?;

    let pool = connect().await?;
    // Transitions never price anything; the default engine is enough.
    let pricing = PricingEngine::new(PricingConfig::default())
        .map_err(|e| CommandError::InvalidArgument(e.to_string()))?;
    let ledger = OrderLedger::new(Arc::new(PgOrderStore::new(pool)), pricing, EventBus::new());

    let order = ledger.transition_by_number(order_number, to, note).await?;
    tracing::info!(
        order_number = %order.order_number,
        status = %order.status,
        "Order updated"
    );
    Ok(())
}

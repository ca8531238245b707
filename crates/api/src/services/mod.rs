//! Business services sitting between the HTTP routes and storage.

pub mod checkout;
pub mod idempotency;
pub mod ledger;
pub mod signing;

pub use checkout::{CheckoutError, CheckoutOutcome, CheckoutReceipt, CheckoutRequest, CheckoutService};
pub use idempotency::{IdempotencyCache, IdempotencyError, IdempotencyKey, IdempotencyScope};
pub use ledger::{OrderError, OrderLedger};
pub use signing::ResponseSigner;

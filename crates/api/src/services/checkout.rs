//! Checkout: turn the caller's cart into exactly one order per idempotency key.
//!
//! The flow for a request carrying `(user, key)`:
//!
//! 1. A fresh cached response for the scope is replayed verbatim.
//! 2. An order already stored under the key (cache expired, or a previous
//!    attempt died after the order was written) is re-rendered and replayed.
//! 3. Otherwise the cart is snapshotted at current catalog prices, the ledger
//!    writes the order and clears the cart, and the rendered receipt is signed
//!    and cached.
//!
//! Rendering is deterministic in the stored order, so every path that
//! reaches the same order produces the same bytes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use marketplace_core::cart::{SnapshotError, snapshot_cart};
use marketplace_core::order::{Address, Order, OrderDraft, OrderNumber, PaymentMethod};
use marketplace_core::pricing::Adjustments;
use marketplace_core::{CurrencyCode, OrderId, ProductId, UserId};

use crate::db::{CartStore, CatalogStore, RepositoryError};
use crate::services::idempotency::{
    CachedResponse, IdempotencyCache, IdempotencyError, IdempotencyKey, IdempotencyScope,
};
use crate::services::ledger::{OrderError, OrderLedger};

/// Checkout failures.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("failed to render checkout response: {0}")]
    Render(#[from] serde_json::Error),

    /// The pipeline did not finish within the configured deadline.
    #[error("Checkout timed out")]
    Timeout,
}

/// Checkout request body. Every field is optional on the wire; a missing
/// shipping address is rejected during pricing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

/// One line of the checkout receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptLine {
    pub name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
}

/// Response body for a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub subtotal: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
    pub currency: CurrencyCode,
    pub line_items: Vec<ReceiptLine>,
}

impl From<&Order> for CheckoutReceipt {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            subtotal: order.totals.subtotal,
            platform_fee: order.totals.platform_fee,
            total: order.totals.total,
            currency: order.currency,
            line_items: order
                .line_items
                .iter()
                .map(|item| ReceiptLine {
                    name: item.name.clone(),
                    price: item.unit_price,
                    quantity: item.quantity,
                    subtotal: item.extended_price,
                })
                .collect(),
        }
    }
}

/// A checkout response ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOutcome {
    pub response: CachedResponse,
    /// `true` when the body was produced by an earlier request.
    pub replayed: bool,
}

/// The checkout pipeline.
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<dyn CatalogStore>,
    carts: Arc<dyn CartStore>,
    ledger: Arc<OrderLedger>,
    idempotency: IdempotencyCache,
    currency: CurrencyCode,
    timeout: Duration,
}

impl CheckoutService {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        carts: Arc<dyn CartStore>,
        ledger: Arc<OrderLedger>,
        idempotency: IdempotencyCache,
        currency: CurrencyCode,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            carts,
            ledger,
            idempotency,
            currency,
            timeout,
        }
    }

    /// Check out `user_id`'s cart under `key`.
    ///
    /// # Errors
    ///
    /// - `Snapshot(EmptyCart)` when there is nothing to buy.
    /// - `Order(Validation(..))` when the request cannot be priced.
    /// - `Timeout` when the deadline passes; any order already written is
    ///   recovered by retrying with the same key.
    #[instrument(skip(self, request), fields(user_id = %user_id, key = key.as_str()))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        key: IdempotencyKey,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let scope = IdempotencyScope { user_id, key };

        if let Some(response) = self.idempotency.get(&scope).await? {
            tracing::info!("Replaying cached checkout response");
            return Ok(CheckoutOutcome {
                response,
                replayed: true,
            });
        }

        tokio::time::timeout(self.timeout, self.place(&scope, request))
            .await
            .map_err(|_| CheckoutError::Timeout)?
    }

    async fn place(
        &self,
        scope: &IdempotencyScope,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if let Some(outcome) = self.recover(scope).await? {
            return Ok(outcome);
        }

        let line_items = match self.snapshot(scope.user_id).await {
            Ok(items) => items,
            Err(CheckoutError::Snapshot(SnapshotError::EmptyCart)) => {
                // A concurrent request with the same key may have just
                // placed the order and cleared the cart.
                return match self.recover(scope).await? {
                    Some(outcome) => Ok(outcome),
                    None => Err(SnapshotError::EmptyCart.into()),
                };
            }
            Err(e) => return Err(e),
        };

        let draft = OrderDraft {
            user_id: scope.user_id,
            idempotency_key: Some(scope.key.as_str().to_owned()),
            line_items,
            shipping_address: request.shipping_address.unwrap_or_default(),
            billing_address: request.billing_address,
            payment_method: request.payment_method,
            adjustments: Adjustments::default(),
            currency: self.currency,
        };

        match self.ledger.create(draft).await {
            Ok(created) => {
                if !created.cart_cleared {
                    tracing::warn!(
                        order_number = %created.order.order_number,
                        "Order placed but cart was not cleared"
                    );
                }
                let response = self.store_receipt(scope, &created.order).await?;
                Ok(CheckoutOutcome {
                    response,
                    replayed: false,
                })
            }
            Err(OrderError::DuplicateIdempotencyKey) => self
                .recover(scope)
                .await?
                .ok_or(CheckoutError::Order(OrderError::DuplicateIdempotencyKey)),
            Err(e) => Err(e.into()),
        }
    }

    /// Replay the order already stored under this scope's key, if any.
    async fn recover(
        &self,
        scope: &IdempotencyScope,
    ) -> Result<Option<CheckoutOutcome>, CheckoutError> {
        let Some(order) = self
            .ledger
            .find_by_idempotency_key(scope.user_id, scope.key.as_str())
            .await?
        else {
            return Ok(None);
        };
        tracing::info!(order_number = %order.order_number, "Recovered order for idempotency key");
        let response = self.store_receipt(scope, &order).await?;
        Ok(Some(CheckoutOutcome {
            response,
            replayed: true,
        }))
    }

    async fn snapshot(
        &self,
        user_id: UserId,
    ) -> Result<Vec<marketplace_core::order::LineItemSnapshot>, CheckoutError> {
        let Some(cart) = self.carts.get_cart(user_id).await? else {
            return Err(SnapshotError::EmptyCart.into());
        };
        if cart.is_empty() {
            return Err(SnapshotError::EmptyCart.into());
        }
        let products: HashMap<ProductId, _> = self
            .catalog
            .get_products(&cart.product_ids())
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();
        Ok(snapshot_cart(&cart, &products)?)
    }

    async fn store_receipt(
        &self,
        scope: &IdempotencyScope,
        order: &Order,
    ) -> Result<CachedResponse, CheckoutError> {
        let body = serde_json::to_string(&CheckoutReceipt::from(order))?;
        Ok(self.idempotency.put(scope, body).await?)
    }
}

//! Order ledger: creation, reads, and lifecycle transitions.
//!
//! The ledger is the only writer of orders. It prices drafts through the
//! [`PricingEngine`], allocates order numbers (retrying on collision), moves
//! orders through the status state machine with conditional updates, and
//! publishes an [`OrderEvent`] for every change.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::instrument;

use marketplace_core::order::{
    NewOrder, Order, OrderDraft, OrderNumber, OrderSummary, OrderValidationError,
    TransitionError,
};
use marketplace_core::pagination::{Cursor, Page, PageLimit};
use marketplace_core::pricing::PricingEngine;
use marketplace_core::{OrderId, OrderStatus, UserId};

use crate::db::{CreatedOrder, OrderStore, RepositoryError};
use crate::events::{EventBus, OrderEvent};

/// Attempts to find an unused order number before giving up.
pub const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Note recorded when an owner cancels.
pub const USER_CANCELLED_NOTE: &str = "User cancelled";

/// Source of candidate order numbers.
pub type OrderNumberGenerator = Arc<dyn Fn() -> OrderNumber + Send + Sync>;

/// Order ledger errors.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] OrderValidationError),

    #[error("Order not found")]
    NotFound,

    /// Caller does not own the order.
    #[error("Forbidden")]
    Forbidden,

    #[error("Order not cancellable")]
    NotCancellable(OrderStatus),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// The order changed between read and conditional update.
    #[error("Order was modified concurrently")]
    ConcurrentModification,

    /// Another request already created the order for this key.
    #[error("order already exists for this idempotency key")]
    DuplicateIdempotencyKey,

    #[error("could not allocate a unique order number after {0} attempts")]
    OrderNumberExhausted(usize),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Persists and transitions orders.
pub struct OrderLedger {
    orders: Arc<dyn OrderStore>,
    pricing: PricingEngine,
    events: EventBus,
    numbers: OrderNumberGenerator,
}

impl OrderLedger {
    /// Ledger with random order numbers.
    #[must_use]
    pub fn new(orders: Arc<dyn OrderStore>, pricing: PricingEngine, events: EventBus) -> Self {
        Self {
            orders,
            pricing,
            events,
            numbers: Arc::new(|| OrderNumber::generate(&mut rand::rng())),
        }
    }

    /// Replace the order number source.
    #[must_use]
    pub fn with_order_numbers(mut self, numbers: OrderNumberGenerator) -> Self {
        self.numbers = numbers;
        self
    }

    /// Price and persist a draft, clearing the owner's cart in the same unit.
    ///
    /// # Errors
    ///
    /// - `Validation` if the draft cannot be priced; nothing is written.
    /// - `DuplicateIdempotencyKey` if an order already exists for the key.
    /// - `OrderNumberExhausted` if every candidate number collided.
    #[instrument(skip(self, draft), fields(user_id = %draft.user_id, order_number))]
    pub async fn create(&self, draft: OrderDraft) -> Result<CreatedOrder, OrderError> {
        let mut new_order = NewOrder::price(draft, &self.pricing, (self.numbers)(), Utc::now())?;

        for attempt in 1..=MAX_ORDER_NUMBER_ATTEMPTS {
            match self.orders.create_order(&new_order).await {
                Ok(created) => {
                    let order = &created.order;
                    tracing::Span::current().record("order_number", order.order_number.as_str());
                    tracing::info!(
                        order_id = %order.id,
                        total = %order.totals.total,
                        "Order created"
                    );
                    self.events.publish(OrderEvent::Created {
                        order_id: order.id,
                        order_number: order.order_number.clone(),
                        user_id: order.user_id,
                        totals: order.totals,
                        at: order.placed_at,
                    });
                    return Ok(created);
                }
                Err(RepositoryError::DuplicateOrderNumber) => {
                    tracing::warn!(attempt, "Order number collision, retrying");
                    new_order.order_number = (self.numbers)();
                }
                Err(RepositoryError::DuplicateIdempotencyKey) => {
                    return Err(OrderError::DuplicateIdempotencyKey);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(OrderError::OrderNumberExhausted(MAX_ORDER_NUMBER_ATTEMPTS))
    }

    /// An order, visible only to its owner.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Forbidden` for someone else's order.
    pub async fn get_for_user(&self, id: OrderId, user_id: UserId) -> Result<Order, OrderError> {
        let order = self.orders.get_order(id).await?.ok_or(OrderError::NotFound)?;
        if order.user_id != user_id {
            return Err(OrderError::Forbidden);
        }
        Ok(order)
    }

    /// The order a user already placed under an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if storage fails.
    pub async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<Order>, OrderError> {
        Ok(self.orders.find_by_idempotency_key(user_id, key).await?)
    }

    /// One page of a user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Repository` if storage fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        cursor: Option<Cursor>,
        limit: PageLimit,
    ) -> Result<Page<OrderSummary>, OrderError> {
        let rows = self.orders.list_for_user(user_id, cursor, limit).await?;
        Ok(Page::from_overfetch(rows, limit).map(OrderSummary::from))
    }

    /// Cancel an order on behalf of its owner.
    ///
    /// # Errors
    ///
    /// `NotFound`/`Forbidden` as for [`Self::get_for_user`];
    /// `NotCancellable` unless the order is `Pending` or `Processing`.
    #[instrument(skip(self, note))]
    pub async fn cancel(
        &self,
        id: OrderId,
        actor: UserId,
        note: Option<String>,
    ) -> Result<Order, OrderError> {
        let order = self.get_for_user(id, actor).await?;
        if !order.status.is_cancellable() {
            return Err(OrderError::NotCancellable(order.status));
        }
        let note = note.unwrap_or_else(|| USER_CANCELLED_NOTE.to_string());
        self.transition(order, OrderStatus::Cancelled, Some(note))
            .await
            .map_err(|e| match e {
                OrderError::InvalidTransition(t) => OrderError::NotCancellable(t.from),
                other => other,
            })
    }

    /// Move an order to `to` by order number (operator use).
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown number, `InvalidTransition` if the state
    /// machine forbids the move.
    #[instrument(skip(self, note))]
    pub async fn transition_by_number(
        &self,
        order_number: &str,
        to: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, OrderError> {
        let order = self
            .orders
            .find_by_order_number(order_number)
            .await?
            .ok_or(OrderError::NotFound)?;
        self.transition(order, to, note).await
    }

    async fn transition(
        &self,
        order: Order,
        to: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, OrderError> {
        let plan = order.plan_transition(to, note, Utc::now())?;
        let updated = self
            .orders
            .apply_transition(order.id, &plan)
            .await?
            .ok_or(OrderError::ConcurrentModification)?;

        tracing::info!(
            order_number = %updated.order_number,
            from = %plan.from,
            to = %plan.to,
            "Order status changed"
        );
        let event = if to == OrderStatus::Cancelled {
            OrderEvent::Cancelled {
                order_id: updated.id,
                order_number: updated.order_number.clone(),
                user_id: updated.user_id,
                note: plan.entry.note.clone(),
                at: plan.entry.at,
            }
        } else {
            OrderEvent::StatusChanged {
                order_id: updated.id,
                order_number: updated.order_number.clone(),
                from: plan.from,
                to: plan.to,
                at: plan.entry.at,
            }
        };
        self.events.publish(event);
        Ok(updated)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal::Decimal;

    use marketplace_core::CurrencyCode;
    use marketplace_core::order::{Address, LineItemSnapshot};
    use marketplace_core::pricing::{Adjustments, PricingConfig};

    use super::*;
    use crate::db::MemoryStore;

    /// Yields `numbers` in order, then random ones.
    fn scripted_order_numbers(numbers: Vec<&'static str>) -> OrderNumberGenerator {
        let queue = std::sync::Mutex::new(std::collections::VecDeque::from(numbers));
        Arc::new(move || {
            let next = queue.lock().unwrap().pop_front();
            next.map_or_else(
                || OrderNumber::generate(&mut rand::rng()),
                |n| OrderNumber::from_stored(n.to_string()),
            )
        })
    }

    fn draft(user: i32, key: &str) -> OrderDraft {
        OrderDraft {
            user_id: UserId::new(user),
            idempotency_key: Some(key.to_string()),
            line_items: vec![LineItemSnapshot {
                product_id: None,
                name: "Lamp".to_string(),
                image: None,
                unit_price: Decimal::from(500),
                quantity: 2,
                extended_price: Decimal::ZERO,
            }],
            shipping_address: Address {
                line1: "1 Main St".to_string(),
                ..Address::default()
            },
            billing_address: None,
            payment_method: None,
            adjustments: Adjustments::default(),
            currency: CurrencyCode::INR,
        }
    }

    fn ledger() -> OrderLedger {
        let store = Arc::new(MemoryStore::new());
        OrderLedger::new(
            store,
            PricingEngine::new(PricingConfig::default()).unwrap(),
            EventBus::new(),
        )
    }

    #[tokio::test]
    async fn test_create_retries_order_number_collision() {
        let ledger = ledger().with_order_numbers(scripted_order_numbers(vec![
            "RE-DUPE-DUPE-DUPE",
            "RE-DUPE-DUPE-DUPE",
            "RE-FRSH-FRSH-FRSH",
        ]));

        let first = ledger.create(draft(1, "a")).await.unwrap();
        let second = ledger.create(draft(1, "b")).await.unwrap();

        assert_eq!(first.order.order_number.as_str(), "RE-DUPE-DUPE-DUPE");
        assert_eq!(second.order.order_number.as_str(), "RE-FRSH-FRSH-FRSH");
    }

    #[tokio::test]
    async fn test_create_gives_up_after_max_attempts() {
        let ledger = ledger().with_order_numbers(Arc::new(|| {
            OrderNumber::from_stored("RE-SAME-SAME-SAME".to_string())
        }));
        ledger.create(draft(1, "a")).await.unwrap();

        let err = ledger.create(draft(1, "b")).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::OrderNumberExhausted(MAX_ORDER_NUMBER_ATTEMPTS)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_key_creates_one_order() {
        let ledger = ledger();
        ledger.create(draft(1, "same")).await.unwrap();
        let err = ledger.create(draft(1, "same")).await.unwrap_err();
        assert!(matches!(err, OrderError::DuplicateIdempotencyKey));

        // Same key, different user: independent.
        ledger.create(draft(2, "same")).await.unwrap();
    }

    #[tokio::test]
    async fn test_created_order_publishes_event() {
        let ledger = ledger();
        let mut events = ledger.events.subscribe();
        let created = ledger.create(draft(1, "a")).await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.name(), "order.created");
        assert_eq!(event.order_number(), &created.order.order_number);
    }

    #[tokio::test]
    async fn test_cancel_pending_then_second_cancel_conflicts() {
        let ledger = ledger();
        let order = ledger.create(draft(1, "a")).await.unwrap().order;

        let cancelled = ledger.cancel(order.id, UserId::new(1), None).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert_eq!(cancelled.timeline.len(), 2);
        assert_eq!(
            cancelled.timeline[1].note.as_deref(),
            Some(USER_CANCELLED_NOTE)
        );

        let err = ledger
            .cancel(order.id, UserId::new(1), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::NotCancellable(OrderStatus::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_cancel_processing_order() {
        let ledger = ledger();
        let order = ledger.create(draft(1, "a")).await.unwrap().order;
        ledger
            .transition_by_number(order.order_number.as_str(), OrderStatus::Processing, None)
            .await
            .unwrap();

        let cancelled = ledger.cancel(order.id, UserId::new(1), None).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(cancelled.timeline.len(), 3);
    }

    #[tokio::test]
    async fn test_delivered_order_is_not_cancellable() {
        let ledger = ledger();
        let order = ledger.create(draft(1, "a")).await.unwrap().order;
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            ledger
                .transition_by_number(order.order_number.as_str(), status, None)
                .await
                .unwrap();
        }

        let err = ledger
            .cancel(order.id, UserId::new(1), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::NotCancellable(OrderStatus::Delivered)
        ));
    }

    #[tokio::test]
    async fn test_other_users_order_is_forbidden() {
        let ledger = ledger();
        let order = ledger.create(draft(1, "a")).await.unwrap().order;

        assert!(matches!(
            ledger.get_for_user(order.id, UserId::new(2)).await,
            Err(OrderError::Forbidden)
        ));
        assert!(matches!(
            ledger.cancel(order.id, UserId::new(2), None).await,
            Err(OrderError::Forbidden)
        ));
        assert!(matches!(
            ledger.get_for_user(OrderId::new(999), UserId::new(1)).await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_backwards_transition_is_rejected() {
        let ledger = ledger();
        let order = ledger.create(draft(1, "a")).await.unwrap().order;
        ledger
            .transition_by_number(order.order_number.as_str(), OrderStatus::Processing, None)
            .await
            .unwrap();

        let err = ledger
            .transition_by_number(order.order_number.as_str(), OrderStatus::Pending, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition(_)));
    }
}

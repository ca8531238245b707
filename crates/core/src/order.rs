//! Orders, line item snapshots, and lifecycle transitions.
//!
//! An order is built once from a priced [`OrderDraft`] and never has its
//! money fields touched again. Afterwards only its status moves, and every
//! move appends one [`TimelineEntry`].

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::SnapshotError;
use crate::pricing::{Adjustments, OrderTotals, PricingEngine};
use crate::types::{CurrencyCode, OrderId, OrderStatus, Product, ProductId, UserId};

/// Crockford base32, no ambiguous characters.
const ORDER_NUMBER_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const ORDER_NUMBER_PREFIX: &str = "RE";
const ORDER_NUMBER_GROUPS: usize = 3;
const ORDER_NUMBER_GROUP_LEN: usize = 4;

/// Note recorded on the initial timeline entry.
pub const ORDER_PLACED_NOTE: &str = "Order placed";

// =============================================================================
// Errors
// =============================================================================

/// Reasons an order cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderValidationError {
    #[error("Cart empty")]
    EmptyLineItems,

    #[error("Shipping address required")]
    MissingShippingAddress,

    #[error("Invalid quantity {quantity} for {name}")]
    InvalidQuantity { name: String, quantity: i32 },

    #[error("{0} must not be negative")]
    NegativeAdjustment(&'static str),

    #[error(transparent)]
    LineItem(#[from] SnapshotError),

    #[error("order totals cannot be computed")]
    Unpriceable,
}

/// A status change the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move order from {from} to {to}")]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

// =============================================================================
// Value types
// =============================================================================

/// Postal address recorded on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

fn default_country() -> String {
    "IN".to_string()
}

impl Address {
    /// An address is usable once it has a non-blank first line.
    #[must_use]
    pub fn has_primary_line(&self) -> bool {
        !self.line1.trim().is_empty()
    }
}

/// Payment details, recorded verbatim and never processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,
}

/// A product frozen into an order.
///
/// `product_id` may dangle (or be `None`) once the product is deleted; the
/// snapshot still carries everything needed to display the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemSnapshot {
    pub product_id: Option<ProductId>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub extended_price: Decimal,
}

impl LineItemSnapshot {
    /// Capture a product at its current price.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` if the quantity is below 1 or the price is
    /// negative or overflows when extended.
    pub fn capture(product: &Product, quantity: i32) -> Result<Self, SnapshotError> {
        if quantity < 1 {
            return Err(SnapshotError::InvalidQuantity {
                product_id: product.id,
                quantity,
            });
        }
        if product.price.is_sign_negative() && !product.price.is_zero() {
            return Err(SnapshotError::Unpriceable(product.id));
        }
        let extended_price = product
            .price
            .checked_mul(Decimal::from(quantity))
            .ok_or(SnapshotError::Unpriceable(product.id))?;

        Ok(Self {
            product_id: Some(product.id),
            name: product.name.clone(),
            image: product.primary_image().map(String::from),
            unit_price: product.price,
            quantity,
            extended_price,
        })
    }

    /// Recompute `extended_price` from `unit_price × quantity`.
    fn recomputed(&self) -> Result<Self, OrderValidationError> {
        if self.quantity < 1 {
            return Err(OrderValidationError::InvalidQuantity {
                name: self.name.clone(),
                quantity: self.quantity,
            });
        }
        let extended_price = self
            .unit_price
            .checked_mul(Decimal::from(self.quantity))
            .ok_or(OrderValidationError::Unpriceable)?;
        Ok(Self {
            extended_price,
            ..self.clone()
        })
    }
}

/// One entry of an order's append-only history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub status: OrderStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Human-shareable order reference, e.g. `RE-7K2M-Q9XD-4H1P`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Generate a fresh random order number (60 bits of entropy).
    ///
    /// Uniqueness is not guaranteed here; storage enforces it and the caller
    /// retries on collision.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let groups: Vec<String> = (0..ORDER_NUMBER_GROUPS)
            .map(|_| {
                (0..ORDER_NUMBER_GROUP_LEN)
                    .filter_map(|_| ORDER_NUMBER_ALPHABET.choose(rng).copied().map(char::from))
                    .collect()
            })
            .collect();
        Self(format!("{ORDER_NUMBER_PREFIX}-{}", groups.join("-")))
    }

    /// Wrap an order number read back from storage.
    #[must_use]
    pub const fn from_stored(value: String) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Building orders
// =============================================================================

/// Everything checkout knows before pricing.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: UserId,
    pub idempotency_key: Option<String>,
    pub line_items: Vec<LineItemSnapshot>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: Option<PaymentMethod>,
    pub adjustments: Adjustments,
    pub currency: CurrencyCode,
}

/// A fully priced order that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub idempotency_key: Option<String>,
    pub status: OrderStatus,
    pub line_items: Vec<LineItemSnapshot>,
    pub totals: OrderTotals,
    pub currency: CurrencyCode,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: Option<PaymentMethod>,
    pub timeline: Vec<TimelineEntry>,
    pub placed_at: DateTime<Utc>,
}

impl NewOrder {
    /// Validate a draft and derive every total from its line items.
    ///
    /// Extended prices supplied in the draft are ignored and recomputed.
    ///
    /// # Errors
    ///
    /// Returns `OrderValidationError` for an empty order, a missing shipping
    /// address, negative adjustments, or totals that cannot be computed.
    pub fn price(
        draft: OrderDraft,
        pricing: &PricingEngine,
        order_number: OrderNumber,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderValidationError> {
        if draft.line_items.is_empty() {
            return Err(OrderValidationError::EmptyLineItems);
        }
        if !draft.shipping_address.has_primary_line() {
            return Err(OrderValidationError::MissingShippingAddress);
        }
        for (name, amount) in [
            ("discount", draft.adjustments.discount),
            ("tax", draft.adjustments.tax),
            ("shipping", draft.adjustments.shipping),
        ] {
            if amount.is_sign_negative() && !amount.is_zero() {
                return Err(OrderValidationError::NegativeAdjustment(name));
            }
        }

        let line_items = draft
            .line_items
            .iter()
            .map(LineItemSnapshot::recomputed)
            .collect::<Result<Vec<_>, _>>()?;
        let subtotal = subtotal_of(&line_items)?;
        let totals = pricing.totals(subtotal, draft.adjustments);

        Ok(Self {
            order_number,
            user_id: draft.user_id,
            idempotency_key: draft.idempotency_key,
            status: OrderStatus::Pending,
            line_items,
            totals,
            currency: draft.currency,
            shipping_address: draft.shipping_address,
            billing_address: draft.billing_address,
            payment_method: draft.payment_method,
            timeline: vec![TimelineEntry {
                status: OrderStatus::Pending,
                at: now,
                note: Some(ORDER_PLACED_NOTE.to_string()),
            }],
            placed_at: now,
        })
    }

    /// Attach storage-assigned fields.
    #[must_use]
    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            order_number: self.order_number,
            user_id: self.user_id,
            idempotency_key: self.idempotency_key,
            status: self.status,
            line_items: self.line_items,
            totals: self.totals,
            currency: self.currency,
            shipping_address: self.shipping_address,
            billing_address: self.billing_address,
            payment_method: self.payment_method,
            timeline: self.timeline,
            placed_at: self.placed_at,
            delivered_at: None,
            cancelled_at: None,
            created_at,
            updated_at: created_at,
        }
    }
}

fn subtotal_of(line_items: &[LineItemSnapshot]) -> Result<Decimal, OrderValidationError> {
    line_items.iter().try_fold(Decimal::ZERO, |sum, item| {
        sum.checked_add(item.extended_price)
            .ok_or(OrderValidationError::Unpriceable)
    })
}

// =============================================================================
// Stored orders
// =============================================================================

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    #[serde(skip)]
    pub idempotency_key: Option<String>,
    pub status: OrderStatus,
    pub line_items: Vec<LineItemSnapshot>,
    #[serde(flatten)]
    pub totals: OrderTotals,
    pub currency: CurrencyCode,
    pub shipping_address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billing_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    pub timeline: Vec<TimelineEntry>,
    pub placed_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated status change, ready to be applied or persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub entry: TimelineEntry,
}

impl Transition {
    /// Timestamp for `delivered_at`, if this transition sets it.
    #[must_use]
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        (self.to == OrderStatus::Delivered).then_some(self.entry.at)
    }

    /// Timestamp for `cancelled_at`, if this transition sets it.
    #[must_use]
    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        (self.to == OrderStatus::Cancelled).then_some(self.entry.at)
    }
}

impl Order {
    /// Check a status change against the state machine.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the current status cannot move to `to`.
    pub fn plan_transition(
        &self,
        to: OrderStatus,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Transition, TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        Ok(Transition {
            from: self.status,
            to,
            entry: TimelineEntry {
                status: to,
                at,
                note,
            },
        })
    }

    /// Apply a planned transition in memory.
    ///
    /// Terminal timestamps are only set the first time.
    pub fn apply(&mut self, transition: &Transition) {
        self.status = transition.to;
        self.timeline.push(transition.entry.clone());
        self.updated_at = transition.entry.at;
        if self.delivered_at.is_none() {
            self.delivered_at = transition.delivered_at();
        }
        if self.cancelled_at.is_none() {
            self.cancelled_at = transition.cancelled_at();
        }
    }

    /// Whether the stored money fields satisfy the totals invariant.
    #[must_use]
    pub fn totals_are_consistent(&self) -> bool {
        let Ok(subtotal) = subtotal_of(&self.line_items) else {
            return false;
        };
        let lines_ok = self.line_items.iter().all(|item| {
            item.unit_price.checked_mul(Decimal::from(item.quantity)) == Some(item.extended_price)
        });
        let total = crate::pricing::compute_total(
            subtotal,
            self.totals.discount_total,
            self.totals.tax_total,
            self.totals.shipping_fee,
            self.totals.platform_fee,
        );
        lines_ok && subtotal == self.totals.subtotal && total == self.totals.total
    }
}

/// Compact order representation used by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub currency: CurrencyCode,
    pub line_items: Vec<LineItemSnapshot>,
}

impl From<Order> for OrderSummary {
    fn from(order: Order) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            created_at: order.created_at,
            status: order.status,
            subtotal: order.totals.subtotal,
            total: order.totals.total,
            currency: order.currency,
            line_items: order.line_items,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::HashSet;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::pricing::PricingConfig;

    fn item(price: i64, quantity: i32) -> LineItemSnapshot {
        LineItemSnapshot {
            product_id: Some(ProductId::new(1)),
            name: "Thing".to_string(),
            image: None,
            unit_price: Decimal::from(price),
            quantity,
            // Deliberately wrong: must be recomputed.
            extended_price: Decimal::from(1),
        }
    }

    fn draft(items: Vec<LineItemSnapshot>) -> OrderDraft {
        OrderDraft {
            user_id: UserId::new(1),
            idempotency_key: Some("key-1".to_string()),
            line_items: items,
            shipping_address: Address {
                line1: "12 MG Road".to_string(),
                ..Address::default()
            },
            billing_address: None,
            payment_method: None,
            adjustments: Adjustments::default(),
            currency: CurrencyCode::INR,
        }
    }

    fn pricing() -> PricingEngine {
        PricingEngine::new(PricingConfig::default()).unwrap()
    }

    fn number() -> OrderNumber {
        OrderNumber::from_stored("RE-TEST-0000-0001".to_string())
    }

    fn placed() -> Order {
        NewOrder::price(draft(vec![item(500, 2)]), &pricing(), number(), Utc::now())
            .unwrap()
            .into_order(OrderId::new(1), Utc::now())
    }

    #[test]
    fn test_price_recomputes_extended_prices_and_totals() {
        let order = NewOrder::price(
            draft(vec![item(500, 2), item(300, 1)]),
            &pricing(),
            number(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(order.line_items[0].extended_price, Decimal::from(1000));
        assert_eq!(order.line_items[1].extended_price, Decimal::from(300));
        assert_eq!(order.totals.subtotal, Decimal::from(1300));
        assert_eq!(order.totals.platform_fee, Decimal::from(22));
        assert_eq!(order.totals.total, Decimal::from(1322));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.timeline.len(), 1);
        assert_eq!(order.timeline[0].status, OrderStatus::Pending);
    }

    #[test]
    fn test_price_requires_line_items_and_address() {
        assert_eq!(
            NewOrder::price(draft(vec![]), &pricing(), number(), Utc::now()),
            Err(OrderValidationError::EmptyLineItems)
        );

        let mut no_address = draft(vec![item(1, 1)]);
        no_address.shipping_address.line1 = "   ".to_string();
        assert_eq!(
            NewOrder::price(no_address, &pricing(), number(), Utc::now()),
            Err(OrderValidationError::MissingShippingAddress)
        );
    }

    #[test]
    fn test_price_rejects_non_positive_quantity() {
        let result = NewOrder::price(draft(vec![item(10, 0)]), &pricing(), number(), Utc::now());
        assert!(matches!(
            result,
            Err(OrderValidationError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn test_priced_order_satisfies_totals_invariant() {
        assert!(placed().totals_are_consistent());
    }

    #[test]
    fn test_cancel_from_pending_sets_cancelled_at_once() {
        let mut order = placed();
        let at = Utc::now();
        let transition = order
            .plan_transition(OrderStatus::Cancelled, Some("User cancelled".to_string()), at)
            .unwrap();
        order.apply(&transition);

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancelled_at, Some(at));
        assert_eq!(order.timeline.len(), 2);
        assert_eq!(order.timeline[1].note.as_deref(), Some("User cancelled"));
    }

    #[test]
    fn test_cannot_cancel_delivered_order() {
        let mut order = placed();
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let t = order.plan_transition(status, None, Utc::now()).unwrap();
            order.apply(&t);
        }
        assert!(order.delivered_at.is_some());

        let err = order
            .plan_transition(OrderStatus::Cancelled, None, Utc::now())
            .unwrap_err();
        assert_eq!(err.from, OrderStatus::Delivered);
        assert_eq!(order.timeline.len(), 4);
    }

    #[test]
    fn test_order_numbers_are_well_formed_and_distinct() {
        let mut rng = StdRng::seed_from_u64(7);
        let numbers: HashSet<_> = (0..1000)
            .map(|_| OrderNumber::generate(&mut rng))
            .collect();
        assert_eq!(numbers.len(), 1000);

        let sample = OrderNumber::generate(&mut rng);
        let parts: Vec<_> = sample.as_str().split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "RE");
        assert!(parts[1..].iter().all(|g| g.len() == 4));
    }

    #[test]
    fn test_order_json_hides_idempotency_key() {
        let json = serde_json::to_value(placed()).unwrap();
        assert!(json.get("idempotencyKey").is_none());
        assert_eq!(json["status"], "Pending");
        assert!(json.get("platformFee").is_some());
    }
}

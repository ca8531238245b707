//! Order repository for `PostgreSQL`.
//!
//! Line items, addresses and the timeline are stored as JSONB snapshots.
//! Money columns are `NUMERIC` and always written from a [`NewOrder`] whose
//! totals were derived server-side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{Connection, PgPool};

use marketplace_core::order::{
    Address, LineItemSnapshot, NewOrder, Order, OrderNumber, PaymentMethod, TimelineEntry,
    Transition,
};
use marketplace_core::pagination::{Cursor, PageLimit};
use marketplace_core::pricing::OrderTotals;
use marketplace_core::{OrderId, OrderStatus, UserId};

use super::carts::clear_cart;
use super::{CreatedOrder, OrderStore, RepositoryError, unique_violation};

const ORDER_COLUMNS: &str = "id, order_number, user_id, idempotency_key, status, line_items, \
                             subtotal, discount_total, tax_total, shipping_fee, platform_fee, \
                             total, currency, shipping_address, billing_address, \
                             payment_method, timeline, placed_at, delivered_at, cancelled_at, \
                             created_at, updated_at";

const ORDER_NUMBER_CONSTRAINT: &str = "order_order_number_key";
const IDEMPOTENCY_CONSTRAINT: &str = "order_user_idempotency_key";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    order_number: String,
    user_id: UserId,
    idempotency_key: Option<String>,
    status: OrderStatus,
    line_items: Json<Vec<LineItemSnapshot>>,
    subtotal: Decimal,
    discount_total: Decimal,
    tax_total: Decimal,
    shipping_fee: Decimal,
    platform_fee: Decimal,
    total: Decimal,
    currency: String,
    shipping_address: Json<Address>,
    billing_address: Option<Json<Address>>,
    payment_method: Option<Json<PaymentMethod>>,
    timeline: Json<Vec<TimelineEntry>>,
    placed_at: DateTime<Utc>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = RepositoryError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let currency = row.currency.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid currency in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            order_number: OrderNumber::from_stored(row.order_number),
            user_id: row.user_id,
            idempotency_key: row.idempotency_key,
            status: row.status,
            line_items: row.line_items.0,
            totals: OrderTotals {
                subtotal: row.subtotal,
                discount_total: row.discount_total,
                tax_total: row.tax_total,
                shipping_fee: row.shipping_fee,
                platform_fee: row.platform_fee,
                total: row.total,
            },
            currency,
            shipping_address: row.shipping_address.0,
            billing_address: row.billing_address.map(|a| a.0),
            payment_method: row.payment_method.map(|p| p.0),
            timeline: row.timeline.0,
            placed_at: row.placed_at,
            delivered_at: row.delivered_at,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `PostgreSQL` order store.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_insert_error(err: sqlx::Error) -> RepositoryError {
    match unique_violation(&err).as_deref() {
        Some(ORDER_NUMBER_CONSTRAINT) => RepositoryError::DuplicateOrderNumber,
        Some(IDEMPOTENCY_CONSTRAINT) => RepositoryError::DuplicateIdempotencyKey,
        Some(other) => RepositoryError::Conflict(format!("unique constraint {other}")),
        None => RepositoryError::Database(err),
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    #[tracing::instrument(skip(self, order), fields(order_number = %order.order_number, user_id = %order.user_id))]
    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            INSERT INTO marketplace."order" (
                order_number, user_id, idempotency_key, status, line_items,
                subtotal, discount_total, tax_total, shipping_fee, platform_fee, total,
                currency, shipping_address, billing_address, payment_method, timeline, placed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.order_number.as_str())
        .bind(order.user_id)
        .bind(order.idempotency_key.as_deref())
        .bind(order.status)
        .bind(Json(&order.line_items))
        .bind(order.totals.subtotal)
        .bind(order.totals.discount_total)
        .bind(order.totals.tax_total)
        .bind(order.totals.shipping_fee)
        .bind(order.totals.platform_fee)
        .bind(order.totals.total)
        .bind(order.currency.code())
        .bind(Json(&order.shipping_address))
        .bind(order.billing_address.as_ref().map(Json))
        .bind(order.payment_method.as_ref().map(Json))
        .bind(Json(&order.timeline))
        .bind(order.placed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_insert_error)?;

        // The clear runs in a savepoint so its failure leaves the order intact.
        let cart_cleared = {
            let mut savepoint = tx.begin().await?;
            match clear_cart(&mut savepoint, order.user_id).await {
                Ok(()) => {
                    savepoint.commit().await?;
                    true
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to clear cart after order creation");
                    savepoint.rollback().await?;
                    false
                }
            }
        };

        tx.commit().await?;

        Ok(CreatedOrder {
            order: Order::try_from(row)?,
            cart_cleared,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"SELECT {ORDER_COLUMNS} FROM marketplace."order" WHERE id = $1"#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn find_by_order_number(&self, number: &str) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"SELECT {ORDER_COLUMNS} FROM marketplace."order" WHERE order_number = $1"#
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM marketplace."order"
            WHERE user_id = $1 AND idempotency_key = $2
            "#
        ))
        .bind(user_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        cursor: Option<Cursor>,
        limit: PageLimit,
    ) -> Result<Vec<Order>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            SELECT {ORDER_COLUMNS}
            FROM marketplace."order"
            WHERE user_id = $1
              AND ($2::timestamptz IS NULL OR created_at < $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        ))
        .bind(user_id)
        .bind(cursor.map(Cursor::before))
        .bind(i64::from(limit.fetch_count()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    #[tracing::instrument(skip(self, transition), fields(from = %transition.from, to = %transition.to))]
    async fn apply_transition(
        &self,
        id: OrderId,
        transition: &Transition,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            r#"
            UPDATE marketplace."order"
            SET status = $2,
                timeline = timeline || $3::jsonb,
                delivered_at = COALESCE(delivered_at, $4),
                cancelled_at = COALESCE(cancelled_at, $5),
                updated_at = $6
            WHERE id = $1 AND status = $7
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(transition.to)
        .bind(Json(vec![&transition.entry]))
        .bind(transition.delivered_at())
        .bind(transition.cancelled_at())
        .bind(transition.entry.at)
        .bind(transition.from)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }
}

//! Order history, detail, and cancellation routes.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use tracing::instrument;

use marketplace_core::OrderId;
use marketplace_core::order::{Order, OrderSummary};
use marketplace_core::pagination::{Cursor, Page, PageLimit};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::routes::PageQuery;
use crate::state::AppState;

/// Message returned with a cancelled order.
pub const ORDER_CANCELLED_MESSAGE: &str = "Order cancelled";

/// Response body for a successful cancel.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: &'static str,
    pub order: Order,
}

/// List the caller's orders, newest first.
///
/// GET /orders?cursor=&limit=
#[instrument(skip(state, query), fields(user_id = %user.id))]
pub async fn list(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<OrderSummary>>> {
    let cursor = Cursor::parse_optional(query.cursor.as_deref())?;
    let limit = PageLimit::clamped(query.limit());
    let page = state.ledger().list_for_user(user.id, cursor, limit).await?;
    Ok(Json(page))
}

/// One order. Only its owner may read it.
///
/// GET /orders/{id}
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn detail(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(state.ledger().get_for_user(id, user.id).await?))
}

/// Cancel a pending or processing order.
///
/// POST /orders/{id}/cancel
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<CancelResponse>> {
    let order = state.ledger().cancel(id, user.id, None).await?;
    Ok(Json(CancelResponse {
        message: ORDER_CANCELLED_MESSAGE,
        order,
    }))
}

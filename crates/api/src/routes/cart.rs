//! Cart routes.
//!
//! The cart stores only product ids and quantities. Every view resolves the
//! products again, so prices shown here are always the current ones.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use marketplace_core::cart::Cart;
use marketplace_core::{ProductId, ProductStatus, UserId};

use crate::db::RepositoryError;
use crate::error::{AppError, Result};
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// `POST /cart` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    #[serde(default = "one")]
    pub quantity: i32,
}

const fn one() -> i32 {
    1
}

/// `PUT /cart/{product_id}` body.
#[derive(Debug, Deserialize)]
pub struct UpdateCartRequest {
    pub quantity: i32,
}

/// One resolved cart line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub product_id: ProductId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub price: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub status: ProductStatus,
}

/// Cart as shown to the user.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: Decimal,
}

impl CartView {
    const fn empty() -> Self {
        Self {
            items: Vec::new(),
            subtotal: Decimal::ZERO,
        }
    }
}

async fn resolve(state: &AppState, cart: Option<Cart>) -> Result<CartView> {
    let Some(cart) = cart else {
        return Ok(CartView::empty());
    };
    let products: HashMap<_, _> = state
        .stores()
        .catalog
        .get_products(&cart.product_ids())
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    // Lines whose product disappeared are left out of the view.
    let items: Vec<CartItemView> = cart
        .lines
        .iter()
        .filter_map(|line| {
            let product = products.get(&line.product_id)?;
            let subtotal = product.price.checked_mul(Decimal::from(line.quantity))?;
            Some(CartItemView {
                product_id: product.id,
                name: product.name.clone(),
                image: product.primary_image().map(String::from),
                price: product.price,
                quantity: line.quantity,
                subtotal,
                status: product.status,
            })
        })
        .collect();
    let subtotal = items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.subtotal))
        .ok_or_else(|| AppError::Internal("cart subtotal overflow".to_string()))?;

    Ok(CartView { items, subtotal })
}

async fn ensure_product(state: &AppState, product_id: ProductId) -> Result<()> {
    state
        .stores()
        .catalog
        .get_product(product_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
}

fn line_not_found(e: RepositoryError, message: &str) -> AppError {
    match e {
        RepositoryError::NotFound => AppError::NotFound(message.to_string()),
        other => other.into(),
    }
}

/// Unwrap a JSON body, turning any rejection into a `{message}` 400.
fn required<T>(body: std::result::Result<Json<T>, JsonRejection>, message: &str) -> Result<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected cart body");
        AppError::BadRequest(message.to_string())
    })
}

async fn current(state: &AppState, user_id: UserId) -> Result<CartView> {
    let cart = state.stores().carts.get_cart(user_id).await?;
    resolve(state, cart).await
}

/// GET /cart
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn view(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartView>> {
    Ok(Json(current(&state, user.id).await?))
}

/// Set a product's quantity, creating the cart on first use.
/// A quantity of zero or less removes the line.
///
/// POST /cart
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    body: std::result::Result<Json<AddToCartRequest>, JsonRejection>,
) -> Result<Json<CartView>> {
    let body = required(body, "productId and quantity required")?;
    ensure_product(&state, body.product_id).await?;
    let cart = state
        .stores()
        .carts
        .set_line(user.id, body.product_id, body.quantity)
        .await
        .map_err(|e| line_not_found(e, "Product not found"))?;
    Ok(Json(resolve(&state, Some(cart)).await?))
}

/// PUT /cart/{product_id}
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
    body: std::result::Result<Json<UpdateCartRequest>, JsonRejection>,
) -> Result<Json<CartView>> {
    let body = required(body, "quantity required")?;
    let cart = state
        .stores()
        .carts
        .update_line(user.id, product_id, body.quantity)
        .await
        .map_err(|e| line_not_found(e, "Cart item not found"))?;
    Ok(Json(resolve(&state, Some(cart)).await?))
}

/// DELETE /cart/{product_id}
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(product_id): Path<ProductId>,
) -> Result<Json<CartView>> {
    let cart = state
        .stores()
        .carts
        .remove_line(user.id, product_id)
        .await
        .map_err(|e| line_not_found(e, "Cart not found"))?;
    Ok(Json(resolve(&state, Some(cart)).await?))
}

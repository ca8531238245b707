//! Carts and the cart snapshot builder.
//!
//! A cart is the only mutable input to checkout. [`snapshot_cart`] freezes it
//! into [`LineItemSnapshot`]s using the products' *current* prices; nothing
//! about the price is taken from the cart itself or from the client.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::LineItemSnapshot;
use crate::types::{CartId, Product, ProductId, UserId};

/// Errors turning a cart into line items.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// Checkout requires at least one line.
    #[error("Cart empty")]
    EmptyCart,

    /// A cart line references a product that no longer exists.
    #[error("product {0} is no longer available")]
    UnresolvedProduct(ProductId),

    /// The product exists but is not for sale.
    #[error("product {name} is not available for purchase")]
    ProductUnavailable { product_id: ProductId, name: String },

    /// Stored quantity violates the cart invariant.
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity { product_id: ProductId, quantity: i32 },

    /// Price is negative or the extended price overflows.
    #[error("cannot compute price for product {0}")]
    Unpriceable(ProductId),
}

/// One cart line. Quantity is always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// A user's cart. Line order is insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new(id: CartId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            lines: Vec::new(),
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Distinct product ids, in cart order.
    #[must_use]
    pub fn product_ids(&self) -> Vec<ProductId> {
        self.lines.iter().map(|line| line.product_id).collect()
    }

    /// Set a line's quantity. Zero or negative removes the line; a new product
    /// is appended at the end.
    pub fn set_quantity(&mut self, product_id: ProductId, quantity: i32) {
        if quantity <= 0 {
            self.lines.retain(|line| line.product_id != product_id);
            return;
        }
        match self
            .lines
            .iter_mut()
            .find(|line| line.product_id == product_id)
        {
            Some(line) => line.quantity = quantity,
            None => self.lines.push(CartLine {
                product_id,
                quantity,
            }),
        }
    }

    /// Remove every line. The cart itself survives.
    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Freeze a cart into line item snapshots.
///
/// `products` must contain the current record for every product in the cart.
/// Output order matches cart order.
///
/// # Errors
///
/// Returns `SnapshotError::EmptyCart` for a cart without lines, and a
/// product-specific error if any line cannot be priced. No partial result is
/// ever returned.
pub fn snapshot_cart(
    cart: &Cart,
    products: &HashMap<ProductId, Product>,
) -> Result<Vec<LineItemSnapshot>, SnapshotError> {
    if cart.is_empty() {
        return Err(SnapshotError::EmptyCart);
    }

    cart.lines
        .iter()
        .map(|line| {
            let product = products
                .get(&line.product_id)
                .ok_or(SnapshotError::UnresolvedProduct(line.product_id))?;
            if !product.is_purchasable() {
                return Err(SnapshotError::ProductUnavailable {
                    product_id: product.id,
                    name: product.name.clone(),
                });
            }
            LineItemSnapshot::capture(product, line.quantity)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::types::{ProductCondition, ProductStatus};

    fn product(id: i32, price: i64) -> Product {
        Product {
            id: ProductId::new(id),
            seller_id: UserId::new(99),
            name: format!("Product {id}"),
            description: String::new(),
            price: Decimal::from(price),
            category: "misc".to_string(),
            condition: ProductCondition::New,
            images: vec![format!("https://img.example/{id}.jpg")],
            status: ProductStatus::Active,
            stock: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn cart_with(lines: &[(i32, i32)]) -> Cart {
        let mut cart = Cart::new(CartId::new(1), UserId::new(1), Utc::now());
        for &(id, qty) in lines {
            cart.set_quantity(ProductId::new(id), qty);
        }
        cart
    }

    fn catalog(products: Vec<Product>) -> HashMap<ProductId, Product> {
        products.into_iter().map(|p| (p.id, p)).collect()
    }

    #[test]
    fn test_set_quantity_updates_and_removes() {
        let mut cart = cart_with(&[(1, 2), (2, 1)]);
        cart.set_quantity(ProductId::new(1), 5);
        assert_eq!(cart.lines[0].quantity, 5);
        assert_eq!(cart.lines.len(), 2);

        cart.set_quantity(ProductId::new(2), 0);
        assert_eq!(cart.product_ids(), vec![ProductId::new(1)]);

        cart.set_quantity(ProductId::new(1), -3);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_snapshot_uses_current_prices_in_cart_order() {
        let cart = cart_with(&[(1, 2), (2, 1)]);
        let items = snapshot_cart(&cart, &catalog(vec![product(2, 300), product(1, 500)])).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].product_id, Some(ProductId::new(1)));
        assert_eq!(items[0].unit_price, Decimal::from(500));
        assert_eq!(items[0].extended_price, Decimal::from(1000));
        assert_eq!(items[1].extended_price, Decimal::from(300));
        assert_eq!(items[0].image.as_deref(), Some("https://img.example/1.jpg"));
    }

    #[test]
    fn test_snapshot_rejects_empty_cart() {
        let cart = cart_with(&[]);
        assert_eq!(
            snapshot_cart(&cart, &HashMap::new()),
            Err(SnapshotError::EmptyCart)
        );
    }

    #[test]
    fn test_snapshot_rejects_missing_product() {
        let cart = cart_with(&[(1, 1), (7, 1)]);
        assert_eq!(
            snapshot_cart(&cart, &catalog(vec![product(1, 10)])),
            Err(SnapshotError::UnresolvedProduct(ProductId::new(7)))
        );
    }

    #[test]
    fn test_snapshot_rejects_sold_product() {
        let mut sold = product(1, 10);
        sold.status = ProductStatus::Sold;
        let cart = cart_with(&[(1, 1)]);
        assert!(matches!(
            snapshot_cart(&cart, &catalog(vec![sold])),
            Err(SnapshotError::ProductUnavailable { .. })
        ));
    }
}

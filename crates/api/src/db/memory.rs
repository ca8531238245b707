//! In-memory backend for catalog, carts and orders.
//!
//! All state sits behind one `tokio::sync::Mutex`, so order creation and the
//! cart clear are trivially atomic and unique constraints are checked under
//! the same lock that inserts. Suitable for a single process only.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};
use tokio::sync::Mutex;

use marketplace_core::cart::Cart;
use marketplace_core::order::{NewOrder, Order, Transition};
use marketplace_core::pagination::{Cursor, PageLimit};
use marketplace_core::{CartId, OrderId, Product, ProductId, ProductStatus, UserId};

use super::{CartStore, CatalogStore, CreatedOrder, NewProduct, OrderStore, RepositoryError};

#[derive(Default)]
struct MemoryState {
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    orders: Vec<Order>,
    next_product_id: i32,
    next_cart_id: i32,
    next_order_id: i32,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Strictly increasing timestamps at the microsecond precision
    /// `PostgreSQL` stores, so cursors behave identically on both backends.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let now = now.duration_trunc(Duration::microseconds(1)).unwrap_or(now);
        let at = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(at);
        at
    }

    fn cart_mut(&mut self, user_id: UserId) -> Result<&mut Cart, RepositoryError> {
        self.carts.get_mut(&user_id).ok_or(RepositoryError::NotFound)
    }
}

/// Single-process store implementing every domain store trait.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change a product's price or status in place (tests and demos).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown product.
    pub async fn update_product(
        &self,
        id: ProductId,
        update: impl FnOnce(&mut Product) + Send,
    ) -> Result<Product, RepositoryError> {
        let mut state = self.state.lock().await;
        let at = state.next_timestamp();
        let product = state.products.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        update(product);
        product.updated_at = at;
        Ok(product.clone())
    }

    /// Remove a product entirely, as a seller deleting a listing would.
    pub async fn delete_product(&self, id: ProductId) {
        let mut state = self.state.lock().await;
        state.products.remove(&id);
        for cart in state.carts.values_mut() {
            cart.lines.retain(|l| l.product_id != id);
        }
    }
}

/// Newest first, strictly before the cursor, at most `limit.fetch_count()`.
fn page_of<'a, T: 'a>(
    items: impl Iterator<Item = &'a T>,
    key: impl Fn(&T) -> (DateTime<Utc>, i32),
    cursor: Option<Cursor>,
    limit: PageLimit,
) -> Vec<T>
where
    T: Clone,
{
    let mut selected: Vec<&T> = items
        .filter(|item| cursor.is_none_or(|c| key(*item).0 < c.before()))
        .collect();
    selected.sort_by_key(|item| std::cmp::Reverse(key(*item)));
    selected
        .into_iter()
        .take(limit.fetch_count() as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.state.lock().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn list_active(
        &self,
        cursor: Option<Cursor>,
        limit: PageLimit,
    ) -> Result<Vec<Product>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(page_of(
            state
                .products
                .values()
                .filter(|p| p.status == ProductStatus::Active),
            |p| (p.created_at, p.id.as_i32()),
            cursor,
            limit,
        ))
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let mut state = self.state.lock().await;
        state.next_product_id += 1;
        let id = ProductId::new(state.next_product_id);
        let at = state.next_timestamp();
        let product = Product {
            id,
            seller_id: product.seller_id,
            name: product.name,
            description: product.description,
            price: product.price,
            category: product.category,
            condition: product.condition,
            images: product.images,
            status: ProductStatus::Active,
            stock: product.stock,
            created_at: at,
            updated_at: at,
        };
        state.products.insert(id, product.clone());
        Ok(product)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.state.lock().await.carts.get(&user_id).cloned())
    }

    async fn set_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, RepositoryError> {
        let mut state = self.state.lock().await;
        if quantity > 0 && !state.products.contains_key(&product_id) {
            return Err(RepositoryError::NotFound);
        }
        let at = state.next_timestamp();
        if !state.carts.contains_key(&user_id) {
            state.next_cart_id += 1;
            let cart = Cart::new(CartId::new(state.next_cart_id), user_id, at);
            state.carts.insert(user_id, cart);
        }
        let cart = state.cart_mut(user_id)?;
        cart.set_quantity(product_id, quantity);
        cart.updated_at = at;
        Ok(cart.clone())
    }

    async fn update_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, RepositoryError> {
        let mut state = self.state.lock().await;
        let at = state.next_timestamp();
        let cart = state.cart_mut(user_id)?;
        if !cart.lines.iter().any(|l| l.product_id == product_id) {
            return Err(RepositoryError::NotFound);
        }
        cart.set_quantity(product_id, quantity);
        cart.updated_at = at;
        Ok(cart.clone())
    }

    async fn remove_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Cart, RepositoryError> {
        let mut state = self.state.lock().await;
        let at = state.next_timestamp();
        let cart = state.cart_mut(user_id)?;
        cart.set_quantity(product_id, 0);
        cart.updated_at = at;
        Ok(cart.clone())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order(&self, order: &NewOrder) -> Result<CreatedOrder, RepositoryError> {
        let mut state = self.state.lock().await;

        if state
            .orders
            .iter()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(RepositoryError::DuplicateOrderNumber);
        }
        if let Some(key) = &order.idempotency_key
            && state.orders.iter().any(|o| {
                o.user_id == order.user_id && o.idempotency_key.as_deref() == Some(key.as_str())
            })
        {
            return Err(RepositoryError::DuplicateIdempotencyKey);
        }

        state.next_order_id += 1;
        let id = OrderId::new(state.next_order_id);
        let created_at = state.next_timestamp();
        let stored = order.clone().into_order(id, created_at);
        state.orders.push(stored.clone());

        let cart_cleared = match state.carts.get_mut(&order.user_id) {
            Some(cart) => {
                cart.clear();
                cart.updated_at = created_at;
                true
            }
            None => true,
        };

        Ok(CreatedOrder {
            order: stored,
            cart_cleared,
        })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn find_by_order_number(&self, number: &str) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .find(|o| o.order_number.as_str() == number)
            .cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .find(|o| o.user_id == user_id && o.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        cursor: Option<Cursor>,
        limit: PageLimit,
    ) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(page_of(
            state.orders.iter().filter(|o| o.user_id == user_id),
            |o| (o.created_at, o.id.as_i32()),
            cursor,
            limit,
        ))
    }

    async fn apply_transition(
        &self,
        id: OrderId,
        transition: &Transition,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.lock().await;
        let Some(order) = state
            .orders
            .iter_mut()
            .find(|o| o.id == id && o.status == transition.from)
        else {
            return Ok(None);
        };
        order.apply(transition);
        Ok(Some(order.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use rust_decimal::Decimal;

    use marketplace_core::ProductCondition;

    use super::*;

    fn listing(name: &str, price: i64) -> NewProduct {
        NewProduct {
            seller_id: UserId::new(99),
            name: name.to_string(),
            description: String::new(),
            price: Decimal::from(price),
            category: "misc".to_string(),
            condition: ProductCondition::New,
            images: vec![],
            stock: 1,
        }
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let a = store.insert_product(listing("a", 1)).await.unwrap();
        let b = store.insert_product(listing("b", 1)).await.unwrap();
        assert!(b.created_at > a.created_at);
    }

    #[tokio::test]
    async fn test_set_line_creates_cart_and_rejects_unknown_product() {
        let store = MemoryStore::new();
        let p = store.insert_product(listing("a", 10)).await.unwrap();
        let user = UserId::new(1);

        let cart = store.set_line(user, p.id, 2).await.unwrap();
        assert_eq!(cart.lines.len(), 1);
        assert_eq!(cart.lines[0].quantity, 2);

        let err = store.set_line(user, ProductId::new(404), 1).await;
        assert!(matches!(err, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_line_requires_existing_line() {
        let store = MemoryStore::new();
        let p = store.insert_product(listing("a", 10)).await.unwrap();
        let user = UserId::new(1);

        assert!(matches!(
            store.update_line(user, p.id, 3).await,
            Err(RepositoryError::NotFound)
        ));
        store.set_line(user, p.id, 1).await.unwrap();
        let cart = store.update_line(user, p.id, 0).await.unwrap();
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn test_list_active_skips_removed_and_pages_newest_first() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store.insert_product(listing(&format!("p{i}"), 5)).await.unwrap();
        }
        store
            .update_product(ProductId::new(2), |p| p.status = ProductStatus::Removed)
            .await
            .unwrap();

        let rows = store
            .list_active(None, PageLimit::clamped(Some(10)))
            .await
            .unwrap();
        let ids: Vec<i32> = rows.iter().map(|p| p.id.as_i32()).collect();
        assert_eq!(ids, vec![4, 3, 1]);
    }
}

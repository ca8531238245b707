//! Cart repository for `PostgreSQL`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use marketplace_core::cart::{Cart, CartLine};
use marketplace_core::{CartId, ProductId, UserId};

use super::{CartStore, RepositoryError};

#[derive(sqlx::FromRow)]
struct CartRow {
    id: CartId,
    user_id: UserId,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    product_id: ProductId,
    quantity: i32,
}

/// `PostgreSQL` cart store.
#[derive(Clone)]
pub struct PgCartStore {
    pool: PgPool,
}

impl PgCartStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Load a user's cart with its lines in insertion order.
pub(crate) async fn load_cart(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Option<Cart>, RepositoryError> {
    let Some(cart) = sqlx::query_as::<_, CartRow>(
        "SELECT id, user_id, updated_at FROM marketplace.cart WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    let lines = sqlx::query_as::<_, CartLineRow>(
        "SELECT product_id, quantity FROM marketplace.cart_line WHERE cart_id = $1 ORDER BY id",
    )
    .bind(cart.id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(Cart {
        id: cart.id,
        user_id: cart.user_id,
        lines: lines
            .into_iter()
            .map(|l| CartLine {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect(),
        updated_at: cart.updated_at,
    }))
}

/// Remove every line of a user's cart. The cart row is kept.
pub(crate) async fn clear_cart(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r"
        WITH touched AS (
            UPDATE marketplace.cart SET updated_at = now()
            WHERE user_id = $1
            RETURNING id
        )
        DELETE FROM marketplace.cart_line
        WHERE cart_id IN (SELECT id FROM touched)
        ",
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_line(
    conn: &mut PgConnection,
    cart_id: CartId,
    product_id: ProductId,
    quantity: i32,
) -> Result<(), RepositoryError> {
    if quantity <= 0 {
        sqlx::query("DELETE FROM marketplace.cart_line WHERE cart_id = $1 AND product_id = $2")
            .bind(cart_id)
            .bind(product_id)
            .execute(&mut *conn)
            .await?;
    } else {
        sqlx::query(
            r"
            INSERT INTO marketplace.cart_line (cart_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(cart_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })?;
    }

    sqlx::query("UPDATE marketplace.cart SET updated_at = now() WHERE id = $1")
        .bind(cart_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        load_cart(&mut conn, user_id).await
    }

    async fn set_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let cart_id: CartId = sqlx::query_scalar(
            r"
            INSERT INTO marketplace.cart (user_id) VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET updated_at = now()
            RETURNING id
            ",
        )
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        write_line(&mut tx, cart_id, product_id, quantity).await?;
        let cart = load_cart(&mut tx, user_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn update_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let cart = load_cart(&mut tx, user_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        if !cart.lines.iter().any(|l| l.product_id == product_id) {
            return Err(RepositoryError::NotFound);
        }

        write_line(&mut tx, cart.id, product_id, quantity).await?;
        let cart = load_cart(&mut tx, user_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;
        Ok(cart)
    }

    async fn remove_line(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Cart, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let cart = load_cart(&mut tx, user_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        write_line(&mut tx, cart.id, product_id, 0).await?;
        let cart = load_cart(&mut tx, user_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;
        Ok(cart)
    }
}

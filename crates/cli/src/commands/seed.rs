//! Seed the catalog with demo listings.
//!
//! # Usage
//!
//! ```bash
//! # Insert demo products
//! mk-cli seed
//!
//! # Also fill user 1's cart with the first two products
//! mk-cli seed --cart-user 1
//! ```

use rust_decimal::Decimal;
use tracing::info;

use marketplace_api::db::{CartStore, CatalogStore, NewProduct, PgCartStore, PgCatalogStore};
use marketplace_core::{ProductCondition, UserId};

use super::{CommandError, connect};

/// Seller that owns the demo listings.
const DEMO_SELLER: i32 = 1;

/// `(name, category, condition, price in whole rupees, stock)`
const DEMO_PRODUCTS: &[(&str, &str, ProductCondition, i64, i32)] = &[
    ("Brass table lamp", "home", ProductCondition::Used, 500, 3),
    ("Cotton throw", "home", ProductCondition::New, 300, 12),
    ("Refurbished phone", "electronics", ProductCondition::Refurbished, 8_999, 2),
    ("Hardcover atlas", "books", ProductCondition::Used, 450, 1),
    ("Cast iron skillet", "kitchen", ProductCondition::New, 1_250, 6),
    ("Trail running shoes", "sports", ProductCondition::Used, 1_800, 1),
];

/// Insert the demo products, optionally adding two of them to a user's cart.
///
/// # Errors
///
/// Returns an error if the database is unreachable or an insert fails.
pub async fn demo(cart_user: Option<i32>) -> Result<(), CommandError> {
    let pool = connect().await?;
    let catalog = PgCatalogStore::new(pool.clone());

    let mut inserted = Vec::with_capacity(DEMO_PRODUCTS.len());
    for &(name, category, condition, price, stock) in DEMO_PRODUCTS {
        let product = catalog
            .insert_product(NewProduct {
                seller_id: UserId::new(DEMO_SELLER),
                name: name.to_string(),
                description: format!("Demo listing: {name}"),
                price: Decimal::from(price),
                category: category.to_string(),
                condition,
                images: Vec::new(),
                stock,
            })
            .await?;
        info!(id = %product.id, name, "Inserted product");
        inserted.push(product);
    }

    if let Some(user) = cart_user {
        let carts = PgCartStore::new(pool);
        let user = UserId::new(user);
        for (product, quantity) in inserted.iter().zip([2, 1]) {
            carts.set_line(user, product.id, quantity).await?;
        }
        info!(%user, "Filled demo cart");
    }

    info!("Seeding complete! {} products inserted", inserted.len());
    Ok(())
}

//! Catalog product as seen by the checkout pipeline.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ProductId, ProductStatus, UserId};

/// Physical condition of a listed product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "marketplace.product_condition", rename_all = "snake_case")
)]
pub enum ProductCondition {
    #[default]
    New,
    Refurbished,
    Used,
}

/// A product listing.
///
/// The price here is the seller's *current* price. Orders never reference it
/// directly; checkout copies it into a line item snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub category: String,
    pub condition: ProductCondition,
    pub images: Vec<String>,
    pub status: ProductStatus,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// The first image, used as the line item thumbnail.
    #[must_use]
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    /// Only active listings can be bought.
    #[must_use]
    pub fn is_purchasable(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

//! Pricing engine: platform fee and order totals.
//!
//! Everything here is pure. The fee formula is
//!
//! ```text
//! platform_fee = floor(max(subtotal, 0) × fee_rate + fee_offset)
//! total        = max(0, subtotal − discount + tax + shipping + platform_fee)
//! ```
//!
//! `fee_rate` and `fee_offset` come from deployment configuration via
//! [`PricingConfig`]; callers never supply them per request.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default platform fee rate (1.7%).
pub const DEFAULT_FEE_RATE: Decimal = Decimal::from_parts(17, 0, 0, false, 3);

/// Errors building a [`PricingEngine`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// Fee rate outside `0..=1`.
    #[error("fee rate must be between 0 and 1, got {0}")]
    InvalidRate(Decimal),

    /// Negative flat offset would allow a negative fee.
    #[error("fee offset must not be negative, got {0}")]
    NegativeOffset(Decimal),
}

/// Fee parameters, injected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Fraction of the subtotal charged as platform fee (e.g. `0.017`).
    pub fee_rate: Decimal,
    /// Flat amount added before flooring.
    pub fee_offset: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            fee_rate: DEFAULT_FEE_RATE,
            fee_offset: Decimal::ZERO,
        }
    }
}

/// Non-fee adjustments applied to an order.
///
/// The checkout path leaves these at zero; they exist so the totals
/// invariant covers every component of an order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustments {
    pub discount: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
}

/// Every monetary component of an order, derived together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub shipping_fee: Decimal,
    pub platform_fee: Decimal,
    pub total: Decimal,
}

/// Computes platform fees and order totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    /// Create a pricing engine after validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns `PricingError` if the rate is outside `0..=1` or the offset is
    /// negative. Both would break the fee's non-negativity or monotonicity.
    pub fn new(config: PricingConfig) -> Result<Self, PricingError> {
        if config.fee_rate.is_sign_negative() || config.fee_rate > Decimal::ONE {
            return Err(PricingError::InvalidRate(config.fee_rate));
        }
        if config.fee_offset.is_sign_negative() && !config.fee_offset.is_zero() {
            return Err(PricingError::NegativeOffset(config.fee_offset));
        }
        Ok(Self { config })
    }

    /// Platform fee for a subtotal, floored to an integer currency unit.
    #[must_use]
    pub fn platform_fee(&self, subtotal: Decimal) -> Decimal {
        subtotal
            .max(Decimal::ZERO)
            .saturating_mul(self.config.fee_rate)
            .saturating_add(self.config.fee_offset)
            .floor()
            .max(Decimal::ZERO)
    }

    /// Derive all totals from a subtotal and adjustments.
    #[must_use]
    pub fn totals(&self, subtotal: Decimal, adjustments: Adjustments) -> OrderTotals {
        let platform_fee = self.platform_fee(subtotal);
        OrderTotals {
            subtotal,
            discount_total: adjustments.discount,
            tax_total: adjustments.tax,
            shipping_fee: adjustments.shipping,
            platform_fee,
            total: compute_total(
                subtotal,
                adjustments.discount,
                adjustments.tax,
                adjustments.shipping,
                platform_fee,
            ),
        }
    }
}

/// Order total, clamped at zero.
#[must_use]
pub fn compute_total(
    subtotal: Decimal,
    discount: Decimal,
    tax: Decimal,
    shipping: Decimal,
    platform_fee: Decimal,
) -> Decimal {
    subtotal
        .saturating_sub(discount)
        .saturating_add(tax)
        .saturating_add(shipping)
        .saturating_add(platform_fee)
        .max(Decimal::ZERO)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn engine(rate: &str, offset: i64) -> PricingEngine {
        PricingEngine::new(PricingConfig {
            fee_rate: rate.parse().unwrap(),
            fee_offset: Decimal::from(offset),
        })
        .unwrap()
    }

    #[test]
    fn test_default_rate_is_one_point_seven_percent() {
        assert_eq!(DEFAULT_FEE_RATE, "0.017".parse::<Decimal>().unwrap());
    }

    #[test]
    fn test_fee_for_reference_cart() {
        // 2 × 500 + 1 × 300
        let subtotal = Decimal::from(1300);
        assert_eq!(engine("0.017", 0).platform_fee(subtotal), Decimal::from(22));
        assert_eq!(engine("0.017", 123).platform_fee(subtotal), Decimal::from(145));
    }

    #[test]
    fn test_fee_floors_fractional_subtotals() {
        let fee = engine("0.017", 0).platform_fee("99.99".parse().unwrap());
        assert_eq!(fee, Decimal::ONE);
    }

    #[test]
    fn test_fee_is_never_negative() {
        let e = engine("0.017", 0);
        assert_eq!(e.platform_fee(Decimal::from(-500)), Decimal::ZERO);
        assert_eq!(e.platform_fee(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_fee_is_monotonic() {
        let e = engine("0.017", 5);
        let mut previous = e.platform_fee(Decimal::ZERO);
        for cents in (0..200_000).step_by(37) {
            let fee = e.platform_fee(Decimal::new(cents, 2));
            assert!(fee >= previous, "fee decreased at {cents} cents");
            previous = fee;
        }
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad_rate = PricingConfig {
            fee_rate: Decimal::from(2),
            fee_offset: Decimal::ZERO,
        };
        assert_eq!(
            PricingEngine::new(bad_rate),
            Err(PricingError::InvalidRate(Decimal::from(2)))
        );

        let bad_offset = PricingConfig {
            fee_rate: DEFAULT_FEE_RATE,
            fee_offset: Decimal::from(-1),
        };
        assert!(matches!(
            PricingEngine::new(bad_offset),
            Err(PricingError::NegativeOffset(_))
        ));
    }

    #[test]
    fn test_total_clamps_at_zero() {
        let total = compute_total(
            Decimal::from(100),
            Decimal::from(500),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::from(1),
        );
        assert_eq!(total, Decimal::ZERO);
    }

    #[test]
    fn test_totals_include_every_component() {
        let totals = engine("0.017", 0).totals(
            Decimal::from(1300),
            Adjustments {
                discount: Decimal::from(100),
                tax: Decimal::from(50),
                shipping: Decimal::from(40),
            },
        );
        assert_eq!(totals.platform_fee, Decimal::from(22));
        assert_eq!(totals.total, Decimal::from(1300 - 100 + 50 + 40 + 22));
    }
}

//! Discount codes
//!
//! The storefront supports a single fixed code. A code only selects a rule;
//! the amount is always derived from the server-computed subtotal.

use rust_decimal::Decimal;
use tracing::warn;

const SAVE10_CODE: &str = "SAVE10";

/// A resolved discount rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Discount {
    #[default]
    None,
    /// Fraction of the subtotal, e.g. `0.10`.
    Percentage(Decimal),
}

impl Discount {
    /// Discount amount for `subtotal`, clamped to `[0, subtotal]`.
    pub fn amount_for(&self, subtotal: Decimal) -> Decimal {
        let raw = match *self {
            Discount::None => Decimal::ZERO,
            Discount::Percentage(rate) => subtotal * rate,
        };
        raw.max(Decimal::ZERO).min(subtotal.max(Decimal::ZERO))
    }
}

/// Resolve a client-supplied code. Unknown codes give no discount.
pub fn resolve(code: Option<&str>) -> Discount {
    let Some(code) = code.map(str::trim).filter(|c| !c.is_empty()) else {
        return Discount::None;
    };

    if code.eq_ignore_ascii_case(SAVE10_CODE) {
        Discount::Percentage(Decimal::new(10, 2))
    } else {
        warn!("Unknown discount code ignored: {}", code);
        Discount::None
    }
}

//! Order total calculation
//!
//! Charges are computed from catalog prices only. The price a client sends
//! with a cart line is display data and never reaches this module's math.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;
use tracing::{error, info};

use crate::discount::Discount;
use crate::models::{CartItem, OrderTotal};
use crate::store::{OracleError, PriceOracle};

/// Smallest amount the provider accepts, in minor units (₹1.00).
pub const MIN_CHARGE_MINOR_UNITS: i64 = 100;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Cart is empty or invalid.")]
    EmptyCart,

    #[error("Invalid data for item {product_id}: quantity must be at least 1.")]
    InvalidQuantity { product_id: String },

    #[error("Could not calculate total. Product information error (some products not found).")]
    CatalogMismatch,

    #[error("Product with ID {product_id} not found or has an invalid price. Order cannot be processed.")]
    UnpricedItem { product_id: String },

    #[error("Order total is too low to process (minimum Rs. 1.00).")]
    TotalTooLow { minor_units: i64 },

    #[error("Could not calculate order total due to missing product price information.")]
    ZeroTotal,

    #[error("Order total is too high to process. Please reduce item quantities.")]
    TotalTooHigh,

    #[error("Could not calculate order total. Please try again.")]
    Oracle(#[from] OracleError),
}

impl PricingError {
    /// Errors caused by the request itself rather than the catalog or server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PricingError::EmptyCart
                | PricingError::InvalidQuantity { .. }
                | PricingError::TotalTooHigh
        )
    }
}

/// Compute the authoritative total for `cart_items`.
pub async fn compute_order_total(
    cart_items: &[CartItem],
    oracle: &dyn PriceOracle,
    shipping_fee: Decimal,
    discount: Discount,
) -> Result<OrderTotal, PricingError> {
    if cart_items.is_empty() {
        return Err(PricingError::EmptyCart);
    }

    if let Some(bad) = cart_items.iter().find(|item| item.quantity < 1) {
        return Err(PricingError::InvalidQuantity {
            product_id: bad.id.normalized(),
        });
    }

    let mut product_ids: Vec<String> = Vec::new();
    for item in cart_items {
        let id = item.id.normalized();
        if !product_ids.contains(&id) {
            product_ids.push(id);
        }
    }

    let records = oracle.fetch_prices(&product_ids).await.map_err(|e| {
        error!("Price lookup failed for {:?}: {}", product_ids, e);
        PricingError::Oracle(e)
    })?;

    if records.is_empty() {
        error!("No catalog records for cart product ids {:?}", product_ids);
        return Err(PricingError::CatalogMismatch);
    }

    let prices: HashMap<String, Option<Decimal>> = records
        .iter()
        .map(|r| (r.id.trim().to_string(), r.unit_price()))
        .collect();

    let mut subtotal = Decimal::ZERO;
    for item in cart_items {
        let product_id = item.id.normalized();
        let unit_price = match prices.get(&product_id) {
            Some(Some(price)) => *price,
            _ => {
                error!("Product {} missing from catalog or unpriced", product_id);
                return Err(PricingError::UnpricedItem { product_id });
            }
        };
        subtotal = unit_price
            .checked_mul(Decimal::from(item.quantity))
            .and_then(|line| subtotal.checked_add(line))
            .ok_or_else(|| {
                error!("Subtotal overflowed at product {} x {}", product_id, item.quantity);
                PricingError::TotalTooHigh
            })?;
    }

    let shipping = if subtotal > Decimal::ZERO {
        shipping_fee
    } else {
        Decimal::ZERO
    };
    let discount = discount.amount_for(subtotal);
    let grand_total = (subtotal - discount)
        .checked_add(shipping)
        .ok_or(PricingError::TotalTooHigh)?;

    // paise は i64 に収まる範囲のみ
    let grand_total_minor_units = grand_total
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|minor| minor.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| {
            error!("Order total Rs.{} does not fit in minor units", grand_total);
            PricingError::TotalTooHigh
        })?;

    if subtotal > Decimal::ZERO && grand_total_minor_units < MIN_CHARGE_MINOR_UNITS {
        error!("Calculated amount Rs.{} is below the provider minimum", grand_total);
        return Err(PricingError::TotalTooLow {
            minor_units: grand_total_minor_units,
        });
    }
    if subtotal.is_zero() {
        error!("Total calculated as zero for product ids {:?}", product_ids);
        return Err(PricingError::ZeroTotal);
    }

    info!(
        "Order total: subtotal={} shipping={} discount={} total={} ({} minor units)",
        subtotal, shipping, discount, grand_total, grand_total_minor_units
    );

    Ok(OrderTotal {
        subtotal,
        shipping,
        discount,
        grand_total,
        grand_total_minor_units,
    })
}

//! Loyalty ledger calculator.
//!
//! Points convert to a percentage discount in fixed 100-point batches,
//! 10% per batch, capped at five batches (50%).

use std::collections::HashMap;

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;
use crate::catalog::Product;
use crate::error::DomainError;

/// Points per redemption batch.
pub const POINTS_PER_BATCH: i64 = 100;

/// Discount percentage granted per batch.
pub const PERCENT_PER_BATCH: u32 = 10;

/// Maximum number of batches redeemable in one order.
pub const MAX_BATCHES: i64 = 5;

/// A computed redemption: percentage, monetary value, and the points it
/// consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    /// Always a multiple of 10, at most 50.
    pub percentage: u32,
    /// Monetary value of the discount against the cart total.
    pub amount: Money,
    /// Always a multiple of 100.
    pub points_redeemed: i64,
}

impl Discount {
    /// The zero discount: nothing redeemed, nothing off.
    pub fn none() -> Self {
        Self {
            percentage: 0,
            amount: Money::zero(),
            points_redeemed: 0,
        }
    }
}

/// Sums the points earned by a cart: `points_per_unit * quantity` over
/// all lines.
pub fn points_earned(
    lines: &[CartLine],
    products: &HashMap<ProductId, Product>,
) -> Result<i64, DomainError> {
    let mut earned = 0i64;
    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or(DomainError::ProductMissing(line.product_id))?;
        earned += product.points_per_unit as i64 * line.quantity as i64;
    }
    Ok(earned)
}

/// Computes the discount a point balance buys against a cart total.
///
/// Fewer than 100 available points yields the zero discount, not an
/// error. The caller guarantees a non-negative cart total.
pub fn discount(available_points: i64, cart_total: Money) -> Discount {
    let batches = (available_points / POINTS_PER_BATCH).clamp(0, MAX_BATCHES);
    if batches == 0 {
        return Discount::none();
    }

    let percentage = batches as u32 * PERCENT_PER_BATCH;
    Discount {
        percentage,
        amount: cart_total.percentage(percentage),
        points_redeemed: batches * POINTS_PER_BATCH,
    }
}

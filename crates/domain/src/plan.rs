//! Checkout planner.
//!
//! [`plan_checkout`] turns authoritative state (cart, products, point
//! balance) plus the caller's terms into the complete write set for one
//! order: stock decrements, low-stock flags, totals, point deltas, and
//! the delivery record's initial fields. It is pure; the store applies
//! a plan atomically and never re-derives any of it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::cart::Cart;
use crate::catalog::Product;
use crate::customer::PointEntryType;
use crate::error::DomainError;
use crate::inventory;
use crate::loyalty::{self, Discount};

/// Settlement note recorded when no home delivery was requested.
pub const PICKUP_NOTE: &str = "pickup";

/// Caller-selected checkout options plus engine policy values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutTerms {
    /// Redeem the customer's points against this order.
    pub redeem_points: bool,
    /// Deliver to an address instead of in-person pickup.
    pub home_delivery: bool,
    /// Required when `home_delivery` is set.
    pub delivery_address: Option<String>,
    /// Flat surcharge applied for home delivery.
    pub delivery_fee: Money,
    /// Days from checkout to the target delivery date.
    pub delivery_lead_days: i64,
}

/// One product's stock change, with its low-stock flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub product_name: String,
    /// Total quantity sold across the cart's lines for this product.
    pub quantity: u32,
    pub new_stock: u32,
    pub reorder_threshold: u32,
    /// True when `new_stock` is at or under the threshold.
    pub low_stock: bool,
}

/// The complete computed write set for one checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutPlan {
    pub adjustments: Vec<StockAdjustment>,
    pub total: Money,
    pub discount: Discount,
    pub delivery_fee: Money,
    /// `total - discount.amount + delivery_fee`.
    pub amount_due: Money,
    pub points_earned: i64,
    /// `balance - points_redeemed + points_earned`. Never negative.
    pub new_balance: i64,
    /// `Redemption` when points were redeemed, else `Accrual`.
    pub entry_type: PointEntryType,
    /// Delivery address, or [`PICKUP_NOTE`].
    pub settlement_note: String,
    pub delivery_date: DateTime<Utc>,
}

/// Computes the write set for checking out `cart` under `terms`.
///
/// `products` and `points_balance` must be the authoritative values the
/// caller intends to write against — inside the transaction, the locked
/// rows; for the user-facing pre-check, the latest read.
pub fn plan_checkout(
    cart: &Cart,
    products: &HashMap<ProductId, Product>,
    points_balance: i64,
    now: DateTime<Utc>,
    terms: &CheckoutTerms,
) -> Result<CheckoutPlan, DomainError> {
    if cart.lines.is_empty() {
        return Err(DomainError::EmptyCart);
    }
    if terms.home_delivery
        && terms
            .delivery_address
            .as_deref()
            .is_none_or(|a| a.trim().is_empty())
    {
        return Err(DomainError::AddressRequired);
    }
    cart.verify_total()?;
    if cart.total.is_negative() {
        return Err(DomainError::NegativeTotal(cart.total));
    }

    inventory::check_availability(&cart.lines, products)?;

    // Quantities folded per product, first-seen order preserved.
    let mut order: Vec<ProductId> = Vec::new();
    let mut sold: HashMap<ProductId, u32> = HashMap::new();
    for line in &cart.lines {
        if !sold.contains_key(&line.product_id) {
            order.push(line.product_id);
        }
        *sold.entry(line.product_id).or_default() += line.quantity;
    }

    let mut adjustments = Vec::with_capacity(order.len());
    for product_id in order {
        let product = products
            .get(&product_id)
            .ok_or(DomainError::ProductMissing(product_id))?;
        let quantity = sold[&product_id];
        let new_stock = inventory::apply_decrement(product.stock, quantity);
        adjustments.push(StockAdjustment {
            product_id,
            product_name: product.name.clone(),
            quantity,
            new_stock,
            reorder_threshold: product.reorder_threshold,
            low_stock: inventory::is_low_stock(new_stock, product.reorder_threshold),
        });
    }

    let points_earned = loyalty::points_earned(&cart.lines, products)?;
    let discount = if terms.redeem_points {
        loyalty::discount(points_balance, cart.total)
    } else {
        Discount::none()
    };

    let delivery_fee = if terms.home_delivery {
        terms.delivery_fee
    } else {
        Money::zero()
    };
    let amount_due = cart.total - discount.amount + delivery_fee;
    let new_balance = points_balance - discount.points_redeemed + points_earned;

    let entry_type = if discount.points_redeemed > 0 {
        PointEntryType::Redemption
    } else {
        PointEntryType::Accrual
    };

    let settlement_note = if terms.home_delivery {
        // Checked non-empty above.
        terms.delivery_address.clone().unwrap_or_default()
    } else {
        PICKUP_NOTE.to_string()
    };

    Ok(CheckoutPlan {
        adjustments,
        total: cart.total,
        discount,
        delivery_fee,
        amount_due,
        points_earned,
        new_balance,
        entry_type,
        settlement_note,
        delivery_date: now + Duration::days(terms.delivery_lead_days),
    })
}

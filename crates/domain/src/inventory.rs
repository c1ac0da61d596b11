//! Inventory guard.
//!
//! Validates requested quantities against stock and computes post-sale
//! levels. Runs twice per checkout: a user-facing pre-check against a
//! possibly stale read, and an authoritative check inside the atomic
//! unit against locked rows.

use std::collections::HashMap;

use common::ProductId;

use crate::cart::CartLine;
use crate::catalog::Product;
use crate::error::DomainError;

/// Fails with `ProductMissing` for unresolvable lines and
/// `InsufficientStock` for lines requesting more than is available.
pub fn check_availability(
    lines: &[CartLine],
    products: &HashMap<ProductId, Product>,
) -> Result<(), DomainError> {
    // Requested quantities are summed per product so a cart with two
    // lines of the same product cannot pass on each line individually.
    let mut requested: HashMap<ProductId, u32> = HashMap::new();
    for line in lines {
        *requested.entry(line.product_id).or_default() += line.quantity;
    }

    for line in lines {
        let product = products
            .get(&line.product_id)
            .ok_or(DomainError::ProductMissing(line.product_id))?;
        let wanted = requested[&line.product_id];
        if wanted > product.stock {
            return Err(DomainError::InsufficientStock {
                product_id: product.id,
                product_name: product.name.clone(),
                requested: wanted,
                available: product.stock,
            });
        }
    }
    Ok(())
}

/// Returns the post-sale stock level. The guard must already have
/// passed for this quantity.
pub fn apply_decrement(stock: u32, quantity: u32) -> u32 {
    debug_assert!(quantity <= stock, "decrement below zero");
    stock.saturating_sub(quantity)
}

/// A product at or under its reorder threshold is flagged for an alert.
/// Low stock never blocks the sale.
pub fn is_low_stock(new_stock: u32, threshold: u32) -> bool {
    new_stock <= threshold
}

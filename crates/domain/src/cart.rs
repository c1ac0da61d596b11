//! Cart snapshot consumed by checkout.

use chrono::{DateTime, Utc};
use common::{CartId, CustomerId, Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A line in a cart.
///
/// Unit price and subtotal are the values captured when the line was
/// added; checkout must never recompute them from the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// The product this line refers to.
    pub product_id: ProductId,

    /// Product name captured for display and invoicing.
    pub product_name: String,

    /// Requested quantity.
    pub quantity: u32,

    /// Price per unit at cart time.
    pub unit_price: Money,

    /// Line subtotal at cart time.
    pub subtotal: Money,
}

impl CartLine {
    /// Creates a new cart line, deriving the subtotal from the captured
    /// unit price.
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
            subtotal: unit_price.multiply(quantity),
        }
    }
}

/// A customer's cart, snapshot at checkout time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub customer_id: CustomerId,
    pub lines: Vec<CartLine>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    /// Set once the cart has been consumed by a successful checkout.
    pub checked_out_at: Option<DateTime<Utc>>,
}

impl Cart {
    /// Returns true if this cart has already been consumed by checkout.
    pub fn is_checked_out(&self) -> bool {
        self.checked_out_at.is_some()
    }

    /// Verifies the cart's declared total against the sum of its line
    /// subtotals. Enforced upstream, re-checked defensively here.
    pub fn verify_total(&self) -> Result<(), DomainError> {
        let computed: Money = self.lines.iter().map(|l| l.subtotal).sum();
        if computed != self.total {
            return Err(DomainError::TotalMismatch {
                declared: self.total,
                computed,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart_with_lines(lines: Vec<CartLine>, total: Money) -> Cart {
        Cart {
            id: CartId::new(),
            customer_id: CustomerId::new(),
            lines,
            total,
            created_at: Utc::now(),
            checked_out_at: None,
        }
    }

    #[test]
    fn line_subtotal_derived_from_unit_price() {
        let line = CartLine::new(ProductId::new(), "Widget", 3, Money::from_cents(1000));
        assert_eq!(line.subtotal.cents(), 3000);
    }

    #[test]
    fn verify_total_accepts_matching_sum() {
        let lines = vec![
            CartLine::new(ProductId::new(), "Widget", 2, Money::from_cents(1000)),
            CartLine::new(ProductId::new(), "Gadget", 1, Money::from_cents(2500)),
        ];
        let cart = cart_with_lines(lines, Money::from_cents(4500));
        assert!(cart.verify_total().is_ok());
    }

    #[test]
    fn verify_total_rejects_mismatch() {
        let lines = vec![CartLine::new(
            ProductId::new(),
            "Widget",
            1,
            Money::from_cents(1000),
        )];
        let cart = cart_with_lines(lines, Money::from_cents(999));
        assert!(matches!(
            cart.verify_total(),
            Err(DomainError::TotalMismatch { .. })
        ));
    }
}

//! Domain error types.

use common::{Money, ProductId};
use thiserror::Error;

use crate::order::DeliveryStatus;

/// Errors that can occur during domain calculations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// The cart has no lines to check out.
    #[error("cart has no lines")]
    EmptyCart,

    /// The cart's declared total does not match the sum of its lines.
    #[error("cart total {declared} does not match the sum of its lines {computed}")]
    TotalMismatch { declared: Money, computed: Money },

    /// The cart total is negative; upstream must never produce this.
    #[error("cart total {0} is negative")]
    NegativeTotal(Money),

    /// Home delivery was requested without a delivery address.
    #[error("delivery address is required for home delivery")]
    AddressRequired,

    /// A cart line references a product that cannot be resolved.
    #[error("product {0} could not be resolved")]
    ProductMissing(ProductId),

    /// Requested quantity exceeds the available stock.
    #[error("insufficient stock for {product_name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: u32,
        available: u32,
    },

    /// The delivery record cannot move to the requested status.
    #[error("delivery cannot move from {from} to {to}")]
    InvalidDeliveryTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
}

//! Checkout error taxonomy.

use common::{CartId, OrderId, ProductId};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the checkout flow.
///
/// Client-caused failures carry enough detail for a human-readable
/// message (the offending product's name in particular); transaction
/// failures keep their source for the operator log but are presented
/// generically at the boundary.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The request itself is malformed. No state was changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The cart was already consumed by an earlier checkout.
    #[error("cart {0} has already been checked out")]
    CartConsumed(CartId),

    /// Requested quantity exceeds the available stock.
    #[error("insufficient stock for {product_name}: requested {requested}, available {available}")]
    InsufficientStock {
        product_name: String,
        requested: u32,
        available: u32,
    },

    /// A cart line references a product the catalog no longer has.
    #[error("product {0} is no longer available")]
    ProductMissing(ProductId),

    /// The order or its delivery is not in a state that allows the
    /// requested operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The delivery was already confirmed.
    #[error("delivery for order {0} has already been confirmed")]
    AlreadyDelivered(OrderId),

    /// The processor has not confirmed the authorization.
    #[error("payment authorization {0} has not been confirmed")]
    PaymentNotConfirmed(String),

    /// The payment gateway failed.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// The atomic unit of work failed and was rolled back in full.
    #[error("transaction failed")]
    Transaction(#[source] StoreError),
}

impl From<DomainError> for CheckoutError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientStock {
                product_name,
                requested,
                available,
                ..
            } => CheckoutError::InsufficientStock {
                product_name,
                requested,
                available,
            },
            DomainError::ProductMissing(id) => CheckoutError::ProductMissing(id),
            DomainError::InvalidDeliveryTransition { .. } => {
                CheckoutError::InvalidState(err.to_string())
            }
            DomainError::EmptyCart
            | DomainError::TotalMismatch { .. }
            | DomainError::NegativeTotal(_)
            | DomainError::AddressRequired => CheckoutError::Validation(err.to_string()),
        }
    }
}

impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CartConsumed(id) => CheckoutError::CartConsumed(id),
            StoreError::AlreadyDelivered(id) => CheckoutError::AlreadyDelivered(id),
            StoreError::MissingRow { entity, id } => CheckoutError::NotFound { entity, id },
            StoreError::Domain(domain_err) => domain_err.into(),
            other => CheckoutError::Transaction(other),
        }
    }
}

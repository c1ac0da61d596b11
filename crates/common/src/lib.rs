//! Shared primitives for the order fulfillment engine.
//!
//! Every entity gets its own UUID newtype so a cart id can never be
//! passed where an order id is expected, and all monetary amounts are
//! carried as [`Money`] in integer cents.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CartId, CustomerId, DeliveryId, OrderId, PaymentId, ProductId};

//! Checkout orchestration for the order fulfillment engine.
//!
//! The [`CheckoutCoordinator`] drives the whole flow: request
//! validation and precondition loads, a user-facing stock pre-check,
//! the store's atomic commit, the payment-method branch, and the
//! post-commit notifier. The payment processor sits behind the
//! [`PaymentGateway`] trait and is only ever called after the commit —
//! no network round trip holds the transaction open.

pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod invoice;
pub mod notifier;

pub use coordinator::{
    CheckoutCoordinator, CheckoutOutcome, CheckoutPolicy, CheckoutRequest, ConfirmedPayment,
};
pub use error::CheckoutError;
pub use gateway::{InMemoryPaymentGateway, IntentStatus, PaymentGateway, PaymentIntent};
pub use invoice::InvoiceDocument;
pub use notifier::{AlertMailer, InMemoryAlertMailer, NotifierError, TracingAlertMailer};

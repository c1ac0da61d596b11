use common::{CartId, OrderId};
use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with the fulfillment store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The cart was already consumed by an earlier checkout.
    #[error("cart {0} has already been checked out")]
    CartConsumed(CartId),

    /// The delivery was already confirmed; confirming again would
    /// duplicate the cash payment record.
    #[error("delivery for order {0} has already been confirmed")]
    AlreadyDelivered(OrderId),

    /// A row the operation depends on does not exist.
    #[error("{entity} {id} not found")]
    MissingRow { entity: &'static str, id: String },

    /// A domain rule failed inside the unit of work; everything was
    /// rolled back.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The storage backend failed for a reason that is not a domain
    /// rule. Used by the in-memory backend's failure injection.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Convenience constructor for [`StoreError::MissingRow`].
    pub fn missing(entity: &'static str, id: impl ToString) -> Self {
        StoreError::MissingRow {
            entity,
            id: id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

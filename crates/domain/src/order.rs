//! Order, delivery, and payment records.

use chrono::{DateTime, Utc};
use common::{CartId, CustomerId, DeliveryId, Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The state of a delivery record.
///
/// Transitions:
/// ```text
/// Pending ──► Preparing ──► Delivered
///    │                          ▲
///    └──────────────────────────┘  (cash collection)
/// ```
///
/// Card orders move to `Preparing` when the payment authorization is
/// opened; cash orders may jump straight to `Delivered` at collection.
/// The asymmetry is deliberate and preserved from the product behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Created with the order; nothing has happened yet.
    #[default]
    Pending,

    /// A card payment authorization has been opened.
    Preparing,

    /// Delivery has been confirmed (terminal state).
    Delivered,
}

impl DeliveryStatus {
    /// Returns true if the delivery can move to `Preparing`.
    pub fn can_prepare(&self) -> bool {
        matches!(self, DeliveryStatus::Pending)
    }

    /// Returns true if the delivery can be confirmed as delivered.
    /// Both `Pending` (cash collection) and `Preparing` (card) qualify.
    pub fn can_deliver(&self) -> bool {
        matches!(self, DeliveryStatus::Pending | DeliveryStatus::Preparing)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Preparing => "preparing",
            DeliveryStatus::Delivered => "delivered",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "preparing" => Some(DeliveryStatus::Preparing),
            "delivered" => Some(DeliveryStatus::Delivered),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an order is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Settled in person at delivery or pickup.
    Cash,
    /// Settled through the remote card processor.
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement state of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Card details as reported back by the processor after capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub brand: String,
    pub last4: String,
    /// `MM/YY` expiry as reported by the processor.
    pub expiry: String,
}

/// The fulfillment/shipment sub-record of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub order_id: OrderId,
    pub status: DeliveryStatus,
    /// Carrier or agent name; unset until assignment.
    pub carrier: Option<String>,
    /// Delivery address, or the `"pickup"` sentinel for collection.
    pub settlement_note: String,
    pub updated_at: DateTime<Utc>,
}

impl Delivery {
    /// Checks that this delivery can move to `to`, returning the typed
    /// transition error otherwise.
    pub fn ensure_transition(&self, to: DeliveryStatus) -> Result<(), DomainError> {
        let allowed = match to {
            DeliveryStatus::Pending => false,
            DeliveryStatus::Preparing => self.status.can_prepare(),
            DeliveryStatus::Delivered => self.status.can_deliver(),
        };
        if allowed {
            Ok(())
        } else {
            Err(DomainError::InvalidDeliveryTransition {
                from: self.status,
                to,
            })
        }
    }
}

/// The committed, priced result of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub cart_id: CartId,
    pub customer_id: CustomerId,
    pub total: Money,
    pub discount: Money,
    pub delivery_fee: Money,
    /// `total - discount + delivery_fee`.
    pub amount_due: Money,
    pub points_earned: i64,
    pub points_redeemed: i64,
    pub delivery_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub delivery: Delivery,
}

/// A settled or pending monetary capture tied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub card: Option<CardSummary>,
    /// The processor's authorization reference for card payments.
    /// Unique across payments; the idempotency key for confirmation.
    pub provider_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

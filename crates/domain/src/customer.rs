//! Customer view and the append-only history ledgers.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::cart::CartLine;

/// A customer as the engine sees it.
///
/// Owned by account management; the engine reads the balance and
/// performs exactly one balance update plus two history appends per
/// successful order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    /// Administrators receive low-stock alerts.
    pub is_admin: bool,
    /// Loyalty point balance. Never negative.
    pub points_balance: i64,
}

/// Whether a point-history entry records accrual or redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointEntryType {
    /// Points were earned without any redemption.
    Accrual,
    /// Points were redeemed (possibly alongside an accrual).
    Redemption,
}

impl PointEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointEntryType::Accrual => "accrual",
            PointEntryType::Redemption => "redemption",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accrual" => Some(PointEntryType::Accrual),
            "redemption" => Some(PointEntryType::Redemption),
            _ => None,
        }
    }
}

impl std::fmt::Display for PointEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One purchase-history row: the itemized record of a committed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEntry {
    pub customer_id: CustomerId,
    pub order_id: OrderId,
    pub lines: Vec<CartLine>,
    pub total: Money,
    pub discount: Money,
    pub amount_due: Money,
    pub points_earned: i64,
    pub points_redeemed: i64,
    pub created_at: DateTime<Utc>,
}

/// One point-history row: a single delta against the balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointEntry {
    pub customer_id: CustomerId,
    pub order_id: OrderId,
    pub entry_type: PointEntryType,
    /// Signed change applied to the balance.
    pub delta: i64,
    /// Balance after the delta was applied.
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

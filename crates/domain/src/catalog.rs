//! Catalog product view.
//!
//! The catalog is owned elsewhere; the engine reads products for
//! validation and writes a single stock decrement per sold line.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// A product as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Current stock level.
    pub stock: u32,
    /// Stock at or below this level triggers a low-stock alert.
    pub reorder_threshold: u32,
    /// Current catalog price. Not used for checkout math; cart lines
    /// carry their own captured prices.
    pub price: Money,
    /// Loyalty points granted per unit sold.
    pub points_per_unit: u32,
}

//! The storage seam of the engine.

use std::collections::HashMap;

use async_trait::async_trait;
use common::{CartId, CustomerId, Money, OrderId, ProductId};
use domain::{
    Cart, CardSummary, CheckoutTerms, Customer, Delivery, Order, Payment, PaymentMethod, Product,
    StockAdjustment,
};

use crate::error::Result;

/// The result of a committed checkout.
#[derive(Debug, Clone)]
pub struct CheckoutCommit {
    /// The created order, including its delivery sub-record.
    pub order: Order,
    /// Products whose post-sale stock is at or under their reorder
    /// threshold. Input for the post-commit low-stock alerts.
    pub low_stock: Vec<StockAdjustment>,
}

/// A confirmed card capture to be recorded against an order.
#[derive(Debug, Clone)]
pub struct NewCardPayment {
    pub amount: Money,
    /// The processor's authorization reference; the idempotency key.
    pub provider_ref: String,
    pub card: Option<CardSummary>,
}

/// Settlement details supplied by delivery confirmation.
#[derive(Debug, Clone)]
pub struct DeliverySettlement {
    pub amount_collected: Money,
    pub method: PaymentMethod,
    pub carrier: Option<String>,
}

/// Storage operations required by the fulfillment engine.
///
/// Reads return `None` for absent rows; writes return typed errors.
/// All mutation methods are atomic: a failed call leaves no partial
/// state behind.
#[async_trait]
pub trait FulfillmentStore: Send + Sync {
    /// Loads a cart with its lines.
    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>>;

    /// Loads a customer.
    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>>;

    /// Loads the products with the given ids. Absent ids are simply
    /// missing from the map; the inventory guard turns that into
    /// `ProductMissing`.
    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>>;

    /// Re-reads a single product's live stock level.
    async fn current_stock(&self, id: ProductId) -> Result<Option<u32>>;

    /// Addresses of all administrator accounts, for low-stock alerts.
    async fn admin_emails(&self) -> Result<Vec<String>>;

    /// Executes the entire checkout state transition as one atomic unit
    /// of work: re-validates stock against authoritative (locked) rows,
    /// debits inventory, creates the order and its pending delivery,
    /// updates the point balance, appends one purchase-history and one
    /// point-history entry, and consumes the cart.
    ///
    /// Concurrent checkouts against the same product serialize here;
    /// the loser observes the decremented stock and fails with
    /// `InsufficientStock`. Any error rolls back every write.
    async fn commit_checkout(&self, cart_id: CartId, terms: &CheckoutTerms)
    -> Result<CheckoutCommit>;

    /// Loads an order with its delivery.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Moves the order's delivery from `pending` to `preparing`.
    /// Called when a card authorization has been opened.
    async fn mark_delivery_preparing(&self, order_id: OrderId) -> Result<Delivery>;

    /// Records a confirmed card capture as a `paid` payment.
    ///
    /// Idempotent on `provider_ref`: recording the same authorization
    /// twice returns the existing payment instead of creating a second
    /// one.
    async fn record_card_payment(
        &self,
        order_id: OrderId,
        payment: NewCardPayment,
    ) -> Result<Payment>;

    /// Finalizes the delivery to `delivered`, assigns the carrier, and,
    /// for cash settlements, creates the `paid` payment record.
    ///
    /// Fails with `AlreadyDelivered` if called twice.
    async fn confirm_delivery(
        &self,
        order_id: OrderId,
        settlement: DeliverySettlement,
    ) -> Result<(Delivery, Option<Payment>)>;
}

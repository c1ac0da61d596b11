//! In-memory store implementation for tests and local runs.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, CustomerId, DeliveryId, OrderId, PaymentId, ProductId};
use domain::{
    Cart, CheckoutTerms, Customer, Delivery, DeliveryStatus, Order, Payment, PaymentMethod,
    PaymentStatus, PointEntry, Product, PurchaseEntry, plan_checkout,
};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::repository::{CheckoutCommit, DeliverySettlement, FulfillmentStore, NewCardPayment};

#[derive(Debug, Default, Clone)]
struct State {
    customers: HashMap<CustomerId, Customer>,
    products: HashMap<ProductId, Product>,
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    purchase_history: Vec<PurchaseEntry>,
    point_history: Vec<PointEntry>,
    fail_on_history: bool,
}

/// In-memory fulfillment store.
///
/// Provides the same interface and atomicity contract as the
/// PostgreSQL implementation: `commit_checkout` stages every write on a
/// copy of the state and swaps it in only when the whole unit of work
/// succeeded, so a forced mid-transaction failure leaves nothing
/// behind.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a customer fixture.
    pub async fn seed_customer(&self, customer: Customer) {
        self.state
            .write()
            .await
            .customers
            .insert(customer.id, customer);
    }

    /// Inserts a product fixture.
    pub async fn seed_product(&self, product: Product) {
        self.state.write().await.products.insert(product.id, product);
    }

    /// Inserts a cart fixture.
    pub async fn seed_cart(&self, cart: Cart) {
        self.state.write().await.carts.insert(cart.id, cart);
    }

    /// Forces the next `commit_checkout` to fail after the stock
    /// decrements and order creation have been staged, before the
    /// balance/history step. Exercises the all-or-nothing contract.
    pub async fn set_fail_on_history(&self, fail: bool) {
        self.state.write().await.fail_on_history = fail;
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of payment records.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    /// Returns all point-history entries for a customer.
    pub async fn point_history_for(&self, customer_id: CustomerId) -> Vec<PointEntry> {
        self.state
            .read()
            .await
            .point_history
            .iter()
            .filter(|e| e.customer_id == customer_id)
            .cloned()
            .collect()
    }

    /// Returns all purchase-history entries for a customer.
    pub async fn purchase_history_for(&self, customer_id: CustomerId) -> Vec<PurchaseEntry> {
        self.state
            .read()
            .await
            .purchase_history
            .iter()
            .filter(|e| e.customer_id == customer_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl FulfillmentStore for InMemoryStore {
    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&id).cloned())
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.state.read().await.customers.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).map(|p| (*id, p.clone())))
            .collect())
    }

    async fn current_stock(&self, id: ProductId) -> Result<Option<u32>> {
        Ok(self.state.read().await.products.get(&id).map(|p| p.stock))
    }

    async fn admin_emails(&self) -> Result<Vec<String>> {
        Ok(self
            .state
            .read()
            .await
            .customers
            .values()
            .filter(|c| c.is_admin)
            .map(|c| c.email.clone())
            .collect())
    }

    async fn commit_checkout(
        &self,
        cart_id: CartId,
        terms: &CheckoutTerms,
    ) -> Result<CheckoutCommit> {
        let mut guard = self.state.write().await;

        // Stage the whole unit of work on a copy; swap it in only on
        // success. The original state is untouched by any failure path.
        let mut staged = guard.clone();
        let now = Utc::now();

        let cart = staged
            .carts
            .get(&cart_id)
            .cloned()
            .ok_or_else(|| StoreError::missing("cart", cart_id))?;
        if cart.is_checked_out() {
            return Err(StoreError::CartConsumed(cart_id));
        }

        let customer = staged
            .customers
            .get(&cart.customer_id)
            .cloned()
            .ok_or_else(|| StoreError::missing("customer", cart.customer_id))?;

        let product_ids: Vec<ProductId> = cart.lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<ProductId, Product> = product_ids
            .iter()
            .filter_map(|id| staged.products.get(id).map(|p| (*id, p.clone())))
            .collect();

        let plan = plan_checkout(&cart, &products, customer.points_balance, now, terms)?;

        // Stock debits.
        for adj in &plan.adjustments {
            let product = staged
                .products
                .get_mut(&adj.product_id)
                .ok_or_else(|| StoreError::missing("product", adj.product_id))?;
            product.stock = adj.new_stock;
        }

        // Order with its pending delivery.
        let order_id = OrderId::new();
        let order = Order {
            id: order_id,
            cart_id,
            customer_id: customer.id,
            total: plan.total,
            discount: plan.discount.amount,
            delivery_fee: plan.delivery_fee,
            amount_due: plan.amount_due,
            points_earned: plan.points_earned,
            points_redeemed: plan.discount.points_redeemed,
            delivery_date: plan.delivery_date,
            created_at: now,
            delivery: Delivery {
                id: DeliveryId::new(),
                order_id,
                status: DeliveryStatus::Pending,
                carrier: None,
                settlement_note: plan.settlement_note.clone(),
                updated_at: now,
            },
        };
        staged.orders.insert(order_id, order.clone());

        if staged.fail_on_history {
            return Err(StoreError::Backend(
                "forced failure before the balance/history step".to_string(),
            ));
        }

        // Balance update and the two ledger appends.
        let balance_customer = staged
            .customers
            .get_mut(&customer.id)
            .ok_or_else(|| StoreError::missing("customer", customer.id))?;
        balance_customer.points_balance = plan.new_balance;

        staged.purchase_history.push(PurchaseEntry {
            customer_id: customer.id,
            order_id,
            lines: cart.lines.clone(),
            total: plan.total,
            discount: plan.discount.amount,
            amount_due: plan.amount_due,
            points_earned: plan.points_earned,
            points_redeemed: plan.discount.points_redeemed,
            created_at: now,
        });
        staged.point_history.push(PointEntry {
            customer_id: customer.id,
            order_id,
            entry_type: plan.entry_type,
            delta: plan.points_earned - plan.discount.points_redeemed,
            balance_after: plan.new_balance,
            created_at: now,
        });

        let staged_cart = staged
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::missing("cart", cart_id))?;
        staged_cart.checked_out_at = Some(now);

        let low_stock = plan
            .adjustments
            .iter()
            .filter(|a| a.low_stock)
            .cloned()
            .collect();

        *guard = staged;
        Ok(CheckoutCommit { order, low_stock })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn mark_delivery_preparing(&self, order_id: OrderId) -> Result<Delivery> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::missing("order", order_id))?;

        order.delivery.ensure_transition(DeliveryStatus::Preparing)?;
        order.delivery.status = DeliveryStatus::Preparing;
        order.delivery.updated_at = Utc::now();
        Ok(order.delivery.clone())
    }

    async fn record_card_payment(
        &self,
        order_id: OrderId,
        payment: NewCardPayment,
    ) -> Result<Payment> {
        let mut state = self.state.write().await;
        if !state.orders.contains_key(&order_id) {
            return Err(StoreError::missing("order", order_id));
        }

        // Idempotency: an existing payment for this authorization wins.
        if let Some(existing) = state
            .payments
            .values()
            .find(|p| p.provider_ref.as_deref() == Some(payment.provider_ref.as_str()))
        {
            return Ok(existing.clone());
        }

        let record = Payment {
            id: PaymentId::new(),
            order_id,
            amount: payment.amount,
            method: PaymentMethod::Card,
            status: PaymentStatus::Paid,
            card: payment.card,
            provider_ref: Some(payment.provider_ref),
            created_at: Utc::now(),
        };
        state.payments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn confirm_delivery(
        &self,
        order_id: OrderId,
        settlement: DeliverySettlement,
    ) -> Result<(Delivery, Option<Payment>)> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::missing("order", order_id))?;

        if order.delivery.status == DeliveryStatus::Delivered {
            return Err(StoreError::AlreadyDelivered(order_id));
        }
        order.delivery.ensure_transition(DeliveryStatus::Delivered)?;
        order.delivery.status = DeliveryStatus::Delivered;
        order.delivery.carrier = settlement.carrier;
        order.delivery.updated_at = Utc::now();
        let delivery = order.delivery.clone();

        let payment = if settlement.method == PaymentMethod::Cash {
            let record = Payment {
                id: PaymentId::new(),
                order_id,
                amount: settlement.amount_collected,
                method: PaymentMethod::Cash,
                status: PaymentStatus::Paid,
                card: None,
                provider_ref: None,
                created_at: Utc::now(),
            };
            state.payments.insert(record.id, record.clone());
            Some(record)
        } else {
            None
        };

        Ok((delivery, payment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use domain::CartLine;

    fn terms() -> CheckoutTerms {
        CheckoutTerms {
            redeem_points: false,
            home_delivery: false,
            delivery_address: None,
            delivery_fee: Money::from_cents(800),
            delivery_lead_days: 3,
        }
    }

    async fn seeded_store() -> (InMemoryStore, CartId, CustomerId, ProductId) {
        let store = InMemoryStore::new();
        let customer_id = CustomerId::new();
        let product_id = ProductId::new();
        let cart_id = CartId::new();

        store
            .seed_customer(Customer {
                id: customer_id,
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                is_admin: false,
                points_balance: 350,
            })
            .await;
        store
            .seed_product(Product {
                id: product_id,
                name: "Widget".to_string(),
                stock: 10,
                reorder_threshold: 5,
                price: Money::from_cents(2500),
                points_per_unit: 4,
            })
            .await;
        let lines = vec![CartLine::new(
            product_id,
            "Widget",
            2,
            Money::from_cents(2500),
        )];
        let total = lines.iter().map(|l| l.subtotal).sum();
        store
            .seed_cart(Cart {
                id: cart_id,
                customer_id,
                lines,
                total,
                created_at: Utc::now(),
                checked_out_at: None,
            })
            .await;

        (store, cart_id, customer_id, product_id)
    }

    #[tokio::test]
    async fn commit_checkout_applies_every_write() {
        let (store, cart_id, customer_id, product_id) = seeded_store().await;

        let commit = store.commit_checkout(cart_id, &terms()).await.unwrap();

        assert_eq!(commit.order.total.cents(), 5000);
        assert_eq!(commit.order.amount_due.cents(), 5000);
        assert_eq!(commit.order.points_earned, 8);
        assert_eq!(commit.order.delivery.status, DeliveryStatus::Pending);

        assert_eq!(store.current_stock(product_id).await.unwrap(), Some(8));
        let customer = store.get_customer(customer_id).await.unwrap().unwrap();
        assert_eq!(customer.points_balance, 358);
        assert_eq!(store.point_history_for(customer_id).await.len(), 1);
        assert_eq!(store.purchase_history_for(customer_id).await.len(), 1);

        let cart = store.get_cart(cart_id).await.unwrap().unwrap();
        assert!(cart.is_checked_out());
    }

    #[tokio::test]
    async fn consuming_a_cart_twice_fails() {
        let (store, cart_id, _, _) = seeded_store().await;

        store.commit_checkout(cart_id, &terms()).await.unwrap();
        let second = store.commit_checkout(cart_id, &terms()).await;
        assert!(matches!(second, Err(StoreError::CartConsumed(_))));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn forced_failure_after_decrement_leaves_no_trace() {
        let (store, cart_id, customer_id, product_id) = seeded_store().await;
        store.set_fail_on_history(true).await;

        let result = store.commit_checkout(cart_id, &terms()).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));

        // Nothing observable changed: stock, balance, orders, cart.
        assert_eq!(store.current_stock(product_id).await.unwrap(), Some(10));
        let customer = store.get_customer(customer_id).await.unwrap().unwrap();
        assert_eq!(customer.points_balance, 350);
        assert_eq!(store.order_count().await, 0);
        assert!(store.point_history_for(customer_id).await.is_empty());
        let cart = store.get_cart(cart_id).await.unwrap().unwrap();
        assert!(!cart.is_checked_out());
    }

    #[tokio::test]
    async fn insufficient_stock_inside_the_unit_rolls_back() {
        let (store, cart_id, _, product_id) = seeded_store().await;

        // Deplete the stock behind the cart's back.
        let mut product = store
            .get_products(&[product_id])
            .await
            .unwrap()
            .remove(&product_id)
            .unwrap();
        product.stock = 1;
        store.seed_product(product).await;

        let result = store.commit_checkout(cart_id, &terms()).await;
        assert!(matches!(
            result,
            Err(StoreError::Domain(
                domain::DomainError::InsufficientStock { .. }
            ))
        ));
        assert_eq!(store.current_stock(product_id).await.unwrap(), Some(1));
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn record_card_payment_is_idempotent_per_authorization() {
        let (store, cart_id, _, _) = seeded_store().await;
        let commit = store.commit_checkout(cart_id, &terms()).await.unwrap();

        let record = NewCardPayment {
            amount: commit.order.amount_due,
            provider_ref: "pi_123".to_string(),
            card: None,
        };
        let first = store
            .record_card_payment(commit.order.id, record.clone())
            .await
            .unwrap();
        let second = store
            .record_card_payment(commit.order.id, record)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn cash_delivery_confirmation_creates_the_paid_payment() {
        let (store, cart_id, _, _) = seeded_store().await;
        let commit = store.commit_checkout(cart_id, &terms()).await.unwrap();

        let (delivery, payment) = store
            .confirm_delivery(
                commit.order.id,
                DeliverySettlement {
                    amount_collected: commit.order.amount_due,
                    method: PaymentMethod::Cash,
                    carrier: Some("Pat".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(delivery.status, DeliveryStatus::Delivered);
        assert_eq!(delivery.carrier.as_deref(), Some("Pat"));
        let payment = payment.unwrap();
        assert_eq!(payment.method, PaymentMethod::Cash);
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.amount, commit.order.amount_due);

        // Confirming again must not create a second payment.
        let again = store
            .confirm_delivery(
                commit.order.id,
                DeliverySettlement {
                    amount_collected: commit.order.amount_due,
                    method: PaymentMethod::Cash,
                    carrier: None,
                },
            )
            .await;
        assert!(matches!(again, Err(StoreError::AlreadyDelivered(_))));
        assert_eq!(store.payment_count().await, 1);
    }

    #[tokio::test]
    async fn preparing_transition_follows_the_state_machine() {
        let (store, cart_id, _, _) = seeded_store().await;
        let commit = store.commit_checkout(cart_id, &terms()).await.unwrap();

        let delivery = store
            .mark_delivery_preparing(commit.order.id)
            .await
            .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Preparing);

        // Preparing twice is an invalid transition.
        let again = store.mark_delivery_preparing(commit.order.id).await;
        assert!(matches!(
            again,
            Err(StoreError::Domain(
                domain::DomainError::InvalidDeliveryTransition { .. }
            ))
        ));
    }
}

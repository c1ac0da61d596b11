//! PostgreSQL-backed fulfillment store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, CustomerId, DeliveryId, Money, OrderId, PaymentId, ProductId};
use domain::{
    Cart, CartLine, CardSummary, CheckoutTerms, Customer, Delivery, DeliveryStatus, Order, Payment,
    PaymentMethod, PaymentStatus, Product, plan_checkout,
};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::repository::{CheckoutCommit, DeliverySettlement, FulfillmentStore, NewCardPayment};

/// PostgreSQL-backed store.
///
/// `commit_checkout` takes row-level locks (`FOR UPDATE`) on the cart,
/// the touched product rows, and the customer row, re-plans against the
/// locked values, and applies every write inside one transaction. Two
/// concurrent checkouts against the same product serialize on the row
/// lock; the loser re-reads the decremented stock and fails with
/// `InsufficientStock` instead of driving stock negative.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the given database URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_line(row: &PgRow) -> Result<CartLine> {
        Ok(CartLine {
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            product_name: row.try_get("product_name")?,
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
        })
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            stock: row.try_get::<i32, _>("stock")? as u32,
            reorder_threshold: row.try_get::<i32, _>("reorder_threshold")? as u32,
            price: Money::from_cents(row.try_get("price_cents")?),
            points_per_unit: row.try_get::<i32, _>("points_per_unit")? as u32,
        })
    }

    fn row_to_delivery(row: &PgRow) -> Result<Delivery> {
        let status_text: String = row.try_get("status")?;
        let status = DeliveryStatus::parse(&status_text)
            .ok_or_else(|| StoreError::Backend(format!("unknown delivery status {status_text}")))?;
        Ok(Delivery {
            id: DeliveryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            status,
            carrier: row.try_get("carrier")?,
            settlement_note: row.try_get("settlement_note")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: &PgRow, delivery: Delivery) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            discount: Money::from_cents(row.try_get("discount_cents")?),
            delivery_fee: Money::from_cents(row.try_get("delivery_fee_cents")?),
            amount_due: Money::from_cents(row.try_get("amount_due_cents")?),
            points_earned: row.try_get("points_earned")?,
            points_redeemed: row.try_get("points_redeemed")?,
            delivery_date: row.try_get("delivery_date")?,
            created_at: row.try_get("created_at")?,
            delivery,
        })
    }

    fn row_to_payment(row: &PgRow) -> Result<Payment> {
        let method_text: String = row.try_get("method")?;
        let method = PaymentMethod::parse(&method_text)
            .ok_or_else(|| StoreError::Backend(format!("unknown payment method {method_text}")))?;
        let status_text: String = row.try_get("status")?;
        let status = PaymentStatus::parse(&status_text)
            .ok_or_else(|| StoreError::Backend(format!("unknown payment status {status_text}")))?;

        let card = match (
            row.try_get::<Option<String>, _>("card_brand")?,
            row.try_get::<Option<String>, _>("card_last4")?,
            row.try_get::<Option<String>, _>("card_expiry")?,
        ) {
            (Some(brand), Some(last4), Some(expiry)) => Some(CardSummary {
                brand,
                last4,
                expiry,
            }),
            _ => None,
        };

        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            amount: Money::from_cents(row.try_get("amount_cents")?),
            method,
            status,
            card,
            provider_ref: row.try_get("provider_ref")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn fetch_lines<'e, E>(executor: E, cart_id: CartId) -> Result<Vec<CartLine>>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let rows = sqlx::query(
            r#"
            SELECT product_id, product_name, quantity, unit_price_cents, subtotal_cents
            FROM cart_lines
            WHERE cart_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_all(executor)
        .await?;

        rows.iter().map(Self::row_to_line).collect()
    }
}

#[async_trait]
impl FulfillmentStore for PostgresStore {
    async fn get_cart(&self, id: CartId) -> Result<Option<Cart>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, total_cents, created_at, checked_out_at
            FROM carts
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let lines = Self::fetch_lines(&self.pool, id).await?;
        Ok(Some(Cart {
            id,
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            lines,
            total: Money::from_cents(row.try_get("total_cents")?),
            created_at: row.try_get("created_at")?,
            checked_out_at: row.try_get("checked_out_at")?,
        }))
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, is_admin, points_balance
            FROM customers
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Customer {
                id,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                is_admin: row.try_get("is_admin")?,
                points_balance: row.try_get("points_balance")?,
            })),
            None => Ok(None),
        }
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, name, stock, reorder_threshold, price_cents, points_per_unit
            FROM products
            WHERE id = ANY($1)
            "#,
        )
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.id, p)))
            .collect()
    }

    async fn current_stock(&self, id: ProductId) -> Result<Option<u32>> {
        let stock: Option<i32> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(stock.map(|s| s as u32))
    }

    async fn admin_emails(&self) -> Result<Vec<String>> {
        let emails: Vec<String> =
            sqlx::query_scalar("SELECT email FROM customers WHERE is_admin ORDER BY email")
                .fetch_all(&self.pool)
                .await?;
        Ok(emails)
    }

    #[tracing::instrument(skip(self, terms))]
    async fn commit_checkout(
        &self,
        cart_id: CartId,
        terms: &CheckoutTerms,
    ) -> Result<CheckoutCommit> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        // Lock the cart row first; it is the unit's anchor.
        let cart_row = sqlx::query(
            r#"
            SELECT customer_id, total_cents, created_at, checked_out_at
            FROM carts
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(cart_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::missing("cart", cart_id))?;

        let checked_out_at: Option<DateTime<Utc>> = cart_row.try_get("checked_out_at")?;
        if checked_out_at.is_some() {
            return Err(StoreError::CartConsumed(cart_id));
        }

        let customer_id = CustomerId::from_uuid(cart_row.try_get::<Uuid, _>("customer_id")?);
        let cart = Cart {
            id: cart_id,
            customer_id,
            lines: Self::fetch_lines(&mut *tx, cart_id).await?,
            total: Money::from_cents(cart_row.try_get("total_cents")?),
            created_at: cart_row.try_get("created_at")?,
            checked_out_at,
        };

        // Authoritative stock: lock the product rows in sorted id order
        // so concurrent checkouts acquire locks in the same sequence.
        let mut product_uuids: Vec<Uuid> =
            cart.lines.iter().map(|l| l.product_id.as_uuid()).collect();
        product_uuids.sort();
        product_uuids.dedup();

        let product_rows = sqlx::query(
            r#"
            SELECT id, name, stock, reorder_threshold, price_cents, points_per_unit
            FROM products
            WHERE id = ANY($1)
            ORDER BY id ASC
            FOR UPDATE
            "#,
        )
        .bind(&product_uuids)
        .fetch_all(&mut *tx)
        .await?;

        let products: HashMap<ProductId, Product> = product_rows
            .iter()
            .map(|row| Self::row_to_product(row).map(|p| (p.id, p)))
            .collect::<Result<_>>()?;

        // Authoritative balance.
        let points_balance: i64 =
            sqlx::query_scalar("SELECT points_balance FROM customers WHERE id = $1 FOR UPDATE")
                .bind(customer_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::missing("customer", customer_id))?;

        // The whole write set, computed against the locked rows. A
        // domain failure here drops the transaction with no writes.
        let plan = plan_checkout(&cart, &products, points_balance, now, terms)?;

        // Stock debits.
        for adj in &plan.adjustments {
            sqlx::query("UPDATE products SET stock = $1 WHERE id = $2")
                .bind(adj.new_stock as i32)
                .bind(adj.product_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        // Order and its pending delivery.
        let order_id = OrderId::new();
        let delivery_id = DeliveryId::new();
        sqlx::query(
            r#"
            INSERT INTO orders (id, cart_id, customer_id, total_cents, discount_cents,
                                delivery_fee_cents, amount_due_cents, points_earned,
                                points_redeemed, delivery_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(cart_id.as_uuid())
        .bind(customer_id.as_uuid())
        .bind(plan.total.cents())
        .bind(plan.discount.amount.cents())
        .bind(plan.delivery_fee.cents())
        .bind(plan.amount_due.cents())
        .bind(plan.points_earned)
        .bind(plan.discount.points_redeemed)
        .bind(plan.delivery_date)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO deliveries (id, order_id, status, carrier, settlement_note, updated_at)
            VALUES ($1, $2, $3, NULL, $4, $5)
            "#,
        )
        .bind(delivery_id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(DeliveryStatus::Pending.as_str())
        .bind(&plan.settlement_note)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Balance update plus the two append-only ledgers.
        sqlx::query("UPDATE customers SET points_balance = $1 WHERE id = $2")
            .bind(plan.new_balance)
            .bind(customer_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO purchase_history (customer_id, order_id, lines, total_cents,
                                          discount_cents, amount_due_cents, points_earned,
                                          points_redeemed, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(customer_id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(serde_json::to_value(&cart.lines)?)
        .bind(plan.total.cents())
        .bind(plan.discount.amount.cents())
        .bind(plan.amount_due.cents())
        .bind(plan.points_earned)
        .bind(plan.discount.points_redeemed)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO point_history (customer_id, order_id, entry_type, delta,
                                       balance_after, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(customer_id.as_uuid())
        .bind(order_id.as_uuid())
        .bind(plan.entry_type.as_str())
        .bind(plan.points_earned - plan.discount.points_redeemed)
        .bind(plan.new_balance)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE carts SET checked_out_at = $1 WHERE id = $2")
            .bind(now)
            .bind(cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let order = Order {
            id: order_id,
            cart_id,
            customer_id,
            total: plan.total,
            discount: plan.discount.amount,
            delivery_fee: plan.delivery_fee,
            amount_due: plan.amount_due,
            points_earned: plan.points_earned,
            points_redeemed: plan.discount.points_redeemed,
            delivery_date: plan.delivery_date,
            created_at: now,
            delivery: Delivery {
                id: delivery_id,
                order_id,
                status: DeliveryStatus::Pending,
                carrier: None,
                settlement_note: plan.settlement_note.clone(),
                updated_at: now,
            },
        };
        let low_stock = plan
            .adjustments
            .iter()
            .filter(|a| a.low_stock)
            .cloned()
            .collect();

        Ok(CheckoutCommit { order, low_stock })
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let order_row = sqlx::query(
            r#"
            SELECT id, cart_id, customer_id, total_cents, discount_cents, delivery_fee_cents,
                   amount_due_cents, points_earned, points_redeemed, delivery_date, created_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(order_row) = order_row else {
            return Ok(None);
        };

        let delivery_row = sqlx::query(
            r#"
            SELECT id, order_id, status, carrier, settlement_note, updated_at
            FROM deliveries
            WHERE order_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;

        let delivery = Self::row_to_delivery(&delivery_row)?;
        Ok(Some(Self::row_to_order(&order_row, delivery)?))
    }

    async fn mark_delivery_preparing(&self, order_id: OrderId) -> Result<Delivery> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT id, order_id, status, carrier, settlement_note, updated_at
            FROM deliveries
            WHERE order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::missing("order", order_id))?;

        let mut delivery = Self::row_to_delivery(&row)?;
        delivery.ensure_transition(DeliveryStatus::Preparing)?;

        let now = Utc::now();
        sqlx::query("UPDATE deliveries SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(DeliveryStatus::Preparing.as_str())
            .bind(now)
            .bind(delivery.id.as_uuid())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        delivery.status = DeliveryStatus::Preparing;
        delivery.updated_at = now;
        Ok(delivery)
    }

    async fn record_card_payment(
        &self,
        order_id: OrderId,
        payment: NewCardPayment,
    ) -> Result<Payment> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::missing("order", order_id));
        }

        // The unique constraint on provider_ref makes this idempotent:
        // a second confirmation inserts nothing and reads the winner.
        let (brand, last4, expiry) = match &payment.card {
            Some(card) => (
                Some(card.brand.clone()),
                Some(card.last4.clone()),
                Some(card.expiry.clone()),
            ),
            None => (None, None, None),
        };
        sqlx::query(
            r#"
            INSERT INTO payments (id, order_id, amount_cents, method, status,
                                  card_brand, card_last4, card_expiry, provider_ref, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT ON CONSTRAINT unique_provider_ref DO NOTHING
            "#,
        )
        .bind(PaymentId::new().as_uuid())
        .bind(order_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(PaymentMethod::Card.as_str())
        .bind(PaymentStatus::Paid.as_str())
        .bind(brand)
        .bind(last4)
        .bind(expiry)
        .bind(&payment.provider_ref)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            r#"
            SELECT id, order_id, amount_cents, method, status, card_brand, card_last4,
                   card_expiry, provider_ref, created_at
            FROM payments
            WHERE provider_ref = $1
            "#,
        )
        .bind(&payment.provider_ref)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Self::row_to_payment(&row)
    }

    async fn confirm_delivery(
        &self,
        order_id: OrderId,
        settlement: DeliverySettlement,
    ) -> Result<(Delivery, Option<Payment>)> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT id, order_id, status, carrier, settlement_note, updated_at
            FROM deliveries
            WHERE order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::missing("order", order_id))?;

        let mut delivery = Self::row_to_delivery(&row)?;
        if delivery.status == DeliveryStatus::Delivered {
            return Err(StoreError::AlreadyDelivered(order_id));
        }
        delivery.ensure_transition(DeliveryStatus::Delivered)?;

        let now = Utc::now();
        sqlx::query(
            "UPDATE deliveries SET status = $1, carrier = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(DeliveryStatus::Delivered.as_str())
        .bind(&settlement.carrier)
        .bind(now)
        .bind(delivery.id.as_uuid())
        .execute(&mut *tx)
        .await?;

        let payment = if settlement.method == PaymentMethod::Cash {
            let payment_id = PaymentId::new();
            sqlx::query(
                r#"
                INSERT INTO payments (id, order_id, amount_cents, method, status, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(payment_id.as_uuid())
            .bind(order_id.as_uuid())
            .bind(settlement.amount_collected.cents())
            .bind(PaymentMethod::Cash.as_str())
            .bind(PaymentStatus::Paid.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            Some(Payment {
                id: payment_id,
                order_id,
                amount: settlement.amount_collected,
                method: PaymentMethod::Cash,
                status: PaymentStatus::Paid,
                card: None,
                provider_ref: None,
                created_at: now,
            })
        } else {
            None
        };
        tx.commit().await?;

        delivery.status = DeliveryStatus::Delivered;
        delivery.carrier = settlement.carrier;
        delivery.updated_at = now;
        Ok((delivery, payment))
    }
}

//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{CartId, CustomerId, Money, ProductId};
use domain::{CartLine, CheckoutTerms, DeliveryStatus, DomainError, PaymentMethod, PaymentStatus};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    DeliverySettlement, FulfillmentStore, NewCardPayment, PostgresStore, StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init();
}

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for the schema
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_fulfillment_schema.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE point_history, purchase_history, payments, deliveries, orders, \
         cart_lines, carts, products, customers",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn terms() -> CheckoutTerms {
    CheckoutTerms {
        redeem_points: false,
        home_delivery: false,
        delivery_address: None,
        delivery_fee: Money::from_cents(800),
        delivery_lead_days: 3,
    }
}

struct Fixture {
    customer_id: CustomerId,
    product_id: ProductId,
    cart_id: CartId,
}

async fn seed_customer(pool: &PgPool, balance: i64, is_admin: bool) -> CustomerId {
    let id = CustomerId::new();
    sqlx::query(
        "INSERT INTO customers (id, name, email, is_admin, points_balance) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(id.as_uuid())
    .bind("Ada Lovelace")
    .bind(format!("{}@example.com", id.as_uuid()))
    .bind(is_admin)
    .bind(balance)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn seed_product(pool: &PgPool, stock: i32, threshold: i32, points: i32) -> ProductId {
    let id = ProductId::new();
    sqlx::query(
        "INSERT INTO products (id, name, stock, reorder_threshold, price_cents, points_per_unit) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id.as_uuid())
    .bind("Widget")
    .bind(stock)
    .bind(threshold)
    .bind(2500i64)
    .bind(points)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn seed_cart(
    pool: &PgPool,
    customer_id: CustomerId,
    product_id: ProductId,
    quantity: i32,
    unit_price_cents: i64,
) -> CartId {
    let id = CartId::new();
    let subtotal = unit_price_cents * quantity as i64;
    sqlx::query(
        "INSERT INTO carts (id, customer_id, total_cents, created_at) VALUES ($1, $2, $3, $4)",
    )
    .bind(id.as_uuid())
    .bind(customer_id.as_uuid())
    .bind(subtotal)
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO cart_lines (cart_id, product_id, product_name, quantity, \
         unit_price_cents, subtotal_cents) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id.as_uuid())
    .bind(product_id.as_uuid())
    .bind("Widget")
    .bind(quantity)
    .bind(unit_price_cents)
    .bind(subtotal)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn seed_fixture(store: &PostgresStore, stock: i32, quantity: i32) -> Fixture {
    let customer_id = seed_customer(store.pool(), 350, false).await;
    let product_id = seed_product(store.pool(), stock, 5, 4).await;
    let cart_id = seed_cart(store.pool(), customer_id, product_id, quantity, 2500).await;
    Fixture {
        customer_id,
        product_id,
        cart_id,
    }
}

#[tokio::test]
#[serial]
async fn commit_checkout_happy_path() {
    let store = get_test_store().await;
    let fx = seed_fixture(&store, 10, 2).await;

    let commit = store.commit_checkout(fx.cart_id, &terms()).await.unwrap();

    assert_eq!(commit.order.total.cents(), 5000);
    assert_eq!(commit.order.amount_due.cents(), 5000);
    assert_eq!(commit.order.points_earned, 8);
    assert_eq!(commit.order.points_redeemed, 0);
    assert_eq!(commit.order.delivery.status, DeliveryStatus::Pending);
    assert!(commit.low_stock.is_empty());

    // Stock debited, balance accrued, ledgers appended, cart consumed.
    assert_eq!(
        store.current_stock(fx.product_id).await.unwrap(),
        Some(8)
    );
    let customer = store.get_customer(fx.customer_id).await.unwrap().unwrap();
    assert_eq!(customer.points_balance, 358);

    let ledger_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM point_history WHERE customer_id = $1")
            .bind(fx.customer_id.as_uuid())
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(ledger_rows, 1);

    let purchase_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM purchase_history WHERE customer_id = $1")
            .bind(fx.customer_id.as_uuid())
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(purchase_rows, 1);

    let cart = store.get_cart(fx.cart_id).await.unwrap().unwrap();
    assert!(cart.is_checked_out());

    // Reloading the order round-trips through the row mapping.
    let reloaded = store.get_order(commit.order.id).await.unwrap().unwrap();
    assert_eq!(reloaded.amount_due, commit.order.amount_due);
    assert_eq!(reloaded.delivery.settlement_note, "pickup");
}

#[tokio::test]
#[serial]
async fn redemption_and_home_delivery_totals() {
    let store = get_test_store().await;
    // Cart total 250.00, balance 350 points: 30% off, 300 redeemed.
    let customer_id = seed_customer(store.pool(), 350, false).await;
    let product_id = seed_product(store.pool(), 50, 5, 4).await;
    let cart_id = seed_cart(store.pool(), customer_id, product_id, 10, 2500).await;

    let commit = store
        .commit_checkout(
            cart_id,
            &CheckoutTerms {
                redeem_points: true,
                home_delivery: true,
                delivery_address: Some("1 Main St".to_string()),
                ..terms()
            },
        )
        .await
        .unwrap();

    assert_eq!(commit.order.discount.cents(), 7500);
    assert_eq!(commit.order.points_redeemed, 300);
    assert_eq!(commit.order.delivery_fee.cents(), 800);
    assert_eq!(commit.order.amount_due.cents(), 25000 - 7500 + 800);
    assert_eq!(commit.order.delivery.settlement_note, "1 Main St");

    let customer = store.get_customer(customer_id).await.unwrap().unwrap();
    assert_eq!(customer.points_balance, 350 - 300 + 40);

    let entry_type: String =
        sqlx::query_scalar("SELECT entry_type FROM point_history WHERE customer_id = $1")
            .bind(customer_id.as_uuid())
            .fetch_one(store.pool())
            .await
            .unwrap();
    assert_eq!(entry_type, "redemption");
}

#[tokio::test]
#[serial]
async fn consuming_a_cart_twice_fails() {
    let store = get_test_store().await;
    let fx = seed_fixture(&store, 10, 2).await;

    store.commit_checkout(fx.cart_id, &terms()).await.unwrap();
    let second = store.commit_checkout(fx.cart_id, &terms()).await;
    assert!(matches!(second, Err(StoreError::CartConsumed(_))));
}

#[tokio::test]
#[serial]
async fn insufficient_stock_rolls_back_everything() {
    let store = get_test_store().await;
    let fx = seed_fixture(&store, 2, 3).await;

    let result = store.commit_checkout(fx.cart_id, &terms()).await;
    match result {
        Err(StoreError::Domain(DomainError::InsufficientStock {
            product_name,
            requested,
            available,
            ..
        })) => {
            assert_eq!(product_name, "Widget");
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // No side effects at all.
    assert_eq!(store.current_stock(fx.product_id).await.unwrap(), Some(2));
    let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(orders, 0);
    let customer = store.get_customer(fx.customer_id).await.unwrap().unwrap();
    assert_eq!(customer.points_balance, 350);
    let cart = store.get_cart(fx.cart_id).await.unwrap().unwrap();
    assert!(!cart.is_checked_out());
}

#[tokio::test]
#[serial]
async fn low_stock_flag_crosses_the_threshold() {
    let store = get_test_store().await;
    // Stock 10, threshold 5, quantity 6: post-sale stock 4 flags.
    let customer_id = seed_customer(store.pool(), 0, false).await;
    let product_id = seed_product(store.pool(), 10, 5, 1).await;
    let cart_id = seed_cart(store.pool(), customer_id, product_id, 6, 1000).await;

    let commit = store.commit_checkout(cart_id, &terms()).await.unwrap();

    assert_eq!(commit.low_stock.len(), 1);
    assert_eq!(commit.low_stock[0].product_id, product_id);
    assert_eq!(commit.low_stock[0].new_stock, 4);
    assert_eq!(store.current_stock(product_id).await.unwrap(), Some(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn concurrent_checkouts_never_oversell() {
    let store = get_test_store().await;

    // Stock covers exactly one of the two orders.
    let product_id = seed_product(store.pool(), 3, 0, 1).await;
    let customer_a = seed_customer(store.pool(), 0, false).await;
    let customer_b = seed_customer(store.pool(), 0, false).await;
    let cart_a = seed_cart(store.pool(), customer_a, product_id, 3, 1000).await;
    let cart_b = seed_cart(store.pool(), customer_b, product_id, 3, 1000).await;

    let store_a = store.clone();
    let store_b = store.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { store_a.commit_checkout(cart_a, &terms()).await }),
        tokio::spawn(async move { store_b.commit_checkout(cart_b, &terms()).await }),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one checkout must win");

    let loser = if a.is_err() { a } else { b };
    assert!(matches!(
        loser,
        Err(StoreError::Domain(DomainError::InsufficientStock { .. }))
    ));

    // Final stock is zero, never negative.
    assert_eq!(store.current_stock(product_id).await.unwrap(), Some(0));
}

#[tokio::test]
#[serial]
async fn record_card_payment_is_idempotent() {
    let store = get_test_store().await;
    let fx = seed_fixture(&store, 10, 2).await;
    let commit = store.commit_checkout(fx.cart_id, &terms()).await.unwrap();

    let record = NewCardPayment {
        amount: commit.order.amount_due,
        provider_ref: "pi_test_123".to_string(),
        card: Some(domain::CardSummary {
            brand: "visa".to_string(),
            last4: "4242".to_string(),
            expiry: "12/30".to_string(),
        }),
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
    assert_eq!(first.status, PaymentStatus::Paid);
    assert_eq!(first.card.as_ref().unwrap().last4, "4242");

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payments")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[serial]
async fn cash_delivery_confirmation_finalizes_and_pays() {
    let store = get_test_store().await;
    let fx = seed_fixture(&store, 10, 2).await;
    let commit = store.commit_checkout(fx.cart_id, &terms()).await.unwrap();

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
}

#[tokio::test]
#[serial]
async fn card_orders_pass_through_preparing() {
    let store = get_test_store().await;
    let fx = seed_fixture(&store, 10, 2).await;
    let commit = store.commit_checkout(fx.cart_id, &terms()).await.unwrap();

    let delivery = store
        .mark_delivery_preparing(commit.order.id)
        .await
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Preparing);

    let (delivery, payment) = store
        .confirm_delivery(
            commit.order.id,
            DeliverySettlement {
                amount_collected: commit.order.amount_due,
                method: PaymentMethod::Card,
                carrier: Some("Pat".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    // Card settlements are recorded at payment confirmation, not here.
    assert!(payment.is_none());
}

#[tokio::test]
#[serial]
async fn missing_rows_are_typed_not_found() {
    let store = get_test_store().await;

    let missing_cart = store.commit_checkout(CartId::new(), &terms()).await;
    assert!(matches!(
        missing_cart,
        Err(StoreError::MissingRow { entity: "cart", .. })
    ));

    let missing_order = store
        .record_card_payment(
            common::OrderId::new(),
            NewCardPayment {
                amount: Money::from_cents(100),
                provider_ref: "pi_none".to_string(),
                card: None,
            },
        )
        .await;
    assert!(matches!(
        missing_order,
        Err(StoreError::MissingRow {
            entity: "order",
            ..
        })
    ));

    assert!(store.get_order(common::OrderId::new()).await.unwrap().is_none());
    assert!(store.get_cart(CartId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn line_prices_are_the_captured_ones() {
    let store = get_test_store().await;
    // Catalog price is 2500 but the cart captured 1999; checkout must
    // charge the captured price.
    let customer_id = seed_customer(store.pool(), 0, false).await;
    let product_id = seed_product(store.pool(), 10, 2, 1).await;
    let cart_id = seed_cart(store.pool(), customer_id, product_id, 2, 1999).await;

    let commit = store.commit_checkout(cart_id, &terms()).await.unwrap();
    assert_eq!(commit.order.total.cents(), 3998);

    let line: CartLine =
        serde_json::from_value::<Vec<CartLine>>(
            sqlx::query_scalar("SELECT lines FROM purchase_history WHERE order_id = $1")
                .bind(commit.order.id.as_uuid())
                .fetch_one(store.pool())
                .await
                .unwrap(),
        )
        .unwrap()
        .remove(0);
    assert_eq!(line.unit_price.cents(), 1999);
}

#[tokio::test]
#[serial]
async fn admin_emails_lists_only_admins() {
    let store = get_test_store().await;
    seed_customer(store.pool(), 0, false).await;
    let admin = seed_customer(store.pool(), 0, true).await;

    let emails = store.admin_emails().await.unwrap();
    assert_eq!(emails, vec![format!("{}@example.com", admin.as_uuid())]);
}

#[tokio::test]
#[serial]
async fn migrations_runner_is_idempotent() {
    let store = get_test_store().await;
    // The schema already exists from the container bootstrap; the
    // migration runner must tolerate being pointed at the same DB.
    let _ = store.run_migrations().await;
    let _: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orders LIMIT 1")
        .fetch_optional(store.pool())
        .await
        .unwrap();
}

//! Checkout coordinator.

use common::{CartId, CustomerId, DeliveryId, Money, OrderId};
use domain::{Cart, CheckoutTerms, Customer, Order, Payment, PaymentMethod, inventory};
use store::{DeliverySettlement, FulfillmentStore, NewCardPayment};

use crate::error::CheckoutError;
use crate::gateway::{IntentStatus, PaymentGateway, PaymentIntent};
use crate::invoice::{self, InvoiceDocument};
use crate::notifier::{self, AlertMailer};

/// Upper bound on any round trip to the remote payment processor. The
/// gateway is only ever called after the transaction has committed, so
/// a slow processor can delay the response but never hold locks.
const GATEWAY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Engine policy values applied to every checkout.
#[derive(Debug, Clone)]
pub struct CheckoutPolicy {
    /// Flat surcharge for home delivery.
    pub delivery_fee: Money,
    /// Days from checkout to the target delivery date.
    pub delivery_lead_days: i64,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        Self {
            delivery_fee: Money::from_cents(800),
            delivery_lead_days: 3,
        }
    }
}

/// A checkout request as it arrives at the system boundary.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub cart_id: CartId,
    pub redeem_points: bool,
    pub payment_method: PaymentMethod,
    pub home_delivery: bool,
    pub delivery_address: Option<String>,
}

/// The result of a successful checkout, branched by payment method.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    /// Cash: the caller proceeds to delivery confirmation.
    CashDue { order: Order },
    /// Card: the caller completes authentication at the redirect.
    CardRedirect {
        order: Order,
        intent_id: String,
        redirect_url: String,
    },
}

impl CheckoutOutcome {
    /// The committed order, whichever branch was taken.
    pub fn order(&self) -> &Order {
        match self {
            CheckoutOutcome::CashDue { order } => order,
            CheckoutOutcome::CardRedirect { order, .. } => order,
        }
    }
}

/// A confirmed card payment with its invoice.
#[derive(Debug, Clone)]
pub struct ConfirmedPayment {
    pub payment: Payment,
    pub invoice: InvoiceDocument,
}

/// Drives the whole checkout flow: precondition loads and the
/// user-facing stock pre-check, the store's atomic commit, the
/// payment-method branch, and the post-commit notifier.
pub struct CheckoutCoordinator<S, G, M>
where
    S: FulfillmentStore,
    G: PaymentGateway,
    M: AlertMailer,
{
    store: S,
    gateway: G,
    mailer: M,
    policy: CheckoutPolicy,
}

impl<S, G, M> CheckoutCoordinator<S, G, M>
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
    G: PaymentGateway,
    M: AlertMailer + Clone + Send + Sync + 'static,
{
    /// Creates a new coordinator over explicitly constructed
    /// dependencies. The caller owns their lifecycle.
    pub fn new(store: S, gateway: G, mailer: M, policy: CheckoutPolicy) -> Self {
        Self {
            store,
            gateway,
            mailer,
            policy,
        }
    }

    fn terms(&self, request: &CheckoutRequest) -> CheckoutTerms {
        CheckoutTerms {
            redeem_points: request.redeem_points,
            home_delivery: request.home_delivery,
            delivery_address: request.delivery_address.clone(),
            delivery_fee: self.policy.delivery_fee,
            delivery_lead_days: self.policy.delivery_lead_days,
        }
    }

    /// Converts a cart into a committed order.
    #[tracing::instrument(skip(self, request), fields(cart_id = %request.cart_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, CheckoutError> {
        metrics::counter!("checkout_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.checkout_inner(&request).await;
        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::counter!("checkout_failed_total").increment(1);
        }
        result
    }

    async fn checkout_inner(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if request.home_delivery
            && request
                .delivery_address
                .as_deref()
                .is_none_or(|a| a.trim().is_empty())
        {
            return Err(CheckoutError::Validation(
                "delivery address is required for home delivery".to_string(),
            ));
        }

        // Preconditions, checked before the transaction.
        let cart = self
            .store
            .get_cart(request.cart_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound {
                entity: "cart",
                id: request.cart_id.to_string(),
            })?;
        if cart.is_checked_out() {
            return Err(CheckoutError::CartConsumed(cart.id));
        }

        self.load_customer(cart.customer_id).await?;

        // Fast-fail stock pre-check against the latest read. The
        // authoritative check re-runs inside the transaction.
        let product_ids: Vec<_> = cart.lines.iter().map(|l| l.product_id).collect();
        let products = self.store.get_products(&product_ids).await?;
        inventory::check_availability(&cart.lines, &products)?;

        // The atomic unit of work.
        let terms = self.terms(request);
        let commit = self.store.commit_checkout(cart.id, &terms).await?;
        let order = commit.order;
        tracing::info!(
            order_id = %order.id,
            amount_due = %order.amount_due,
            points_redeemed = order.points_redeemed,
            "checkout committed"
        );

        // Post-commit side effects are fire-and-forget: they never
        // block or revert the order.
        if !commit.low_stock.is_empty() {
            let store = self.store.clone();
            let mailer = self.mailer.clone();
            let flagged = commit.low_stock;
            tokio::spawn(async move {
                notifier::dispatch_low_stock_alerts(&store, &mailer, &flagged).await;
            });
        }

        // Payment dispatch, strictly after commit.
        match request.payment_method {
            PaymentMethod::Cash => Ok(CheckoutOutcome::CashDue { order }),
            PaymentMethod::Card => {
                let intent = with_gateway_timeout(self.gateway.create_intent(
                    order.id,
                    order.amount_due,
                    &format!("Order {} for {}", order.id, order.customer_id),
                ))
                .await?;
                let delivery = self.store.mark_delivery_preparing(order.id).await?;

                let redirect_url =
                    format!("/pay/{}?session={}", order.id, intent.client_secret);
                let mut order = order;
                order.delivery = delivery;
                Ok(CheckoutOutcome::CardRedirect {
                    order,
                    intent_id: intent.id,
                    redirect_url,
                })
            }
        }
    }

    /// Reconciles a confirmed card capture into a payment record and
    /// returns the invoice.
    ///
    /// Safe to call more than once for the same authorization: the
    /// store deduplicates on the authorization reference.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_card_payment(
        &self,
        order_id: OrderId,
        intent_id: &str,
    ) -> Result<ConfirmedPayment, CheckoutError> {
        let order = self.load_order(order_id).await?;

        let intent = with_gateway_timeout(self.gateway.retrieve_intent(intent_id)).await?;
        if intent.status != IntentStatus::Succeeded {
            return Err(CheckoutError::PaymentNotConfirmed(intent_id.to_string()));
        }

        let payment = self
            .store
            .record_card_payment(
                order.id,
                NewCardPayment {
                    amount: order.amount_due,
                    provider_ref: intent.id,
                    card: intent.card,
                },
            )
            .await?;
        metrics::counter!("payments_confirmed_total").increment(1);
        tracing::info!(order_id = %order.id, payment_id = %payment.id, "card payment recorded");

        let invoice = self.render_invoice(&order).await?;
        Ok(ConfirmedPayment { payment, invoice })
    }

    /// Produces the invoice for an order, for the owning customer only.
    /// Non-owners get `NotFound`; existence is not leaked.
    pub async fn invoice_for(
        &self,
        order_id: OrderId,
        requester: CustomerId,
    ) -> Result<InvoiceDocument, CheckoutError> {
        let order = self.load_order(order_id).await?;
        if order.customer_id != requester {
            return Err(CheckoutError::NotFound {
                entity: "order",
                id: order_id.to_string(),
            });
        }
        self.render_invoice(&order).await
    }

    /// Finalizes a delivery; for cash settlements this also creates the
    /// `paid` payment record.
    #[tracing::instrument(skip(self, settlement))]
    pub async fn confirm_delivery(
        &self,
        order_id: OrderId,
        settlement: DeliverySettlement,
    ) -> Result<(OrderId, DeliveryId), CheckoutError> {
        if settlement.amount_collected.is_negative() {
            return Err(CheckoutError::Validation(
                "collected amount cannot be negative".to_string(),
            ));
        }

        let (delivery, payment) = self.store.confirm_delivery(order_id, settlement).await?;
        tracing::info!(
            %order_id,
            delivery_id = %delivery.id,
            paid = payment.is_some(),
            "delivery confirmed"
        );
        Ok((order_id, delivery.id))
    }

    async fn load_order(&self, order_id: OrderId) -> Result<Order, CheckoutError> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound {
                entity: "order",
                id: order_id.to_string(),
            })
    }

    async fn load_customer(&self, customer_id: CustomerId) -> Result<Customer, CheckoutError> {
        self.store
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound {
                entity: "customer",
                id: customer_id.to_string(),
            })
    }

    async fn load_cart(&self, cart_id: CartId) -> Result<Cart, CheckoutError> {
        self.store
            .get_cart(cart_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound {
                entity: "cart",
                id: cart_id.to_string(),
            })
    }

    async fn render_invoice(&self, order: &Order) -> Result<InvoiceDocument, CheckoutError> {
        let customer = self.load_customer(order.customer_id).await?;
        let cart = self.load_cart(order.cart_id).await?;
        Ok(invoice::generate(order, &customer, &cart))
    }
}

async fn with_gateway_timeout<F>(call: F) -> Result<PaymentIntent, CheckoutError>
where
    F: std::future::Future<Output = Result<PaymentIntent, CheckoutError>>,
{
    tokio::time::timeout(GATEWAY_TIMEOUT, call)
        .await
        .map_err(|_| CheckoutError::Gateway("payment processor timed out".to_string()))?
}

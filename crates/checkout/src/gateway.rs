//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId};
use domain::CardSummary;

use crate::error::CheckoutError;

/// Lifecycle state of a remote payment authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    /// Opened; the customer still has to authenticate client-side.
    RequiresAction,
    /// The processor captured the amount.
    Succeeded,
    /// The authorization was abandoned or voided.
    Canceled,
}

/// A remote payment authorization as the processor reports it.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// The processor's opaque authorization reference.
    pub id: String,
    /// Client-side secret for completing authentication.
    pub client_secret: String,
    pub status: IntentStatus,
    /// Amount in minor currency units.
    pub amount: Money,
    /// Card details, available once the capture succeeded.
    pub card: Option<CardSummary>,
}

/// Trait for the remote card processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens an authorization for `amount`, tagged with the order id
    /// and a human-readable description.
    async fn create_intent(
        &self,
        order_id: OrderId,
        amount: Money,
        description: &str,
    ) -> Result<PaymentIntent, CheckoutError>;

    /// Retrieves an authorization by its reference.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, CheckoutError>;
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: HashMap<String, (OrderId, PaymentIntent)>,
    next_id: u32,
    fail_on_create: bool,
    auto_capture: bool,
}

/// In-memory payment gateway for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway. Intents start in
    /// `RequiresAction` until [`Self::mark_succeeded`] is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a gateway whose intents capture immediately. Useful for
    /// local runs without a client-side authentication step.
    pub fn with_auto_capture() -> Self {
        let gateway = Self::default();
        gateway.state.write().unwrap().auto_capture = true;
        gateway
    }

    /// Configures the gateway to fail on the next create call.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Marks an intent as captured, attaching a card summary the way
    /// the processor would.
    pub fn mark_succeeded(&self, intent_id: &str) {
        let mut state = self.state.write().unwrap();
        if let Some((_, intent)) = state.intents.get_mut(intent_id) {
            intent.status = IntentStatus::Succeeded;
            intent.card = Some(CardSummary {
                brand: "visa".to_string(),
                last4: "4242".to_string(),
                expiry: "12/30".to_string(),
            });
        }
    }

    /// Returns the number of open intents.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents.len()
    }

    /// Returns the order an intent was opened for.
    pub fn order_for(&self, intent_id: &str) -> Option<OrderId> {
        self.state
            .read()
            .unwrap()
            .intents
            .get(intent_id)
            .map(|(order_id, _)| *order_id)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(
        &self,
        order_id: OrderId,
        amount: Money,
        description: &str,
    ) -> Result<PaymentIntent, CheckoutError> {
        let _ = description;
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(CheckoutError::Gateway("authorization declined".to_string()));
        }

        state.next_id += 1;
        let id = format!("pi_{:04}", state.next_id);
        let mut intent = PaymentIntent {
            client_secret: format!("{id}_secret"),
            id: id.clone(),
            status: IntentStatus::RequiresAction,
            amount,
            card: None,
        };
        if state.auto_capture {
            intent.status = IntentStatus::Succeeded;
            intent.card = Some(CardSummary {
                brand: "visa".to_string(),
                last4: "4242".to_string(),
                expiry: "12/30".to_string(),
            });
        }
        state.intents.insert(id, (order_id, intent.clone()));

        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, CheckoutError> {
        self.state
            .read()
            .unwrap()
            .intents
            .get(intent_id)
            .map(|(_, intent)| intent.clone())
            .ok_or_else(|| CheckoutError::Gateway(format!("unknown authorization {intent_id}")))
    }
}

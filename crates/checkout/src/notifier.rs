//! Post-commit notifier: low-stock alerts.
//!
//! Runs strictly after the checkout transaction has committed, never
//! inside it. A notifier failure is logged and isolated; it can never
//! block or revert the order.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{StockAdjustment, inventory};
use store::FulfillmentStore;
use thiserror::Error;

/// Errors internal to the notifier. These are logged, never surfaced
/// to the order response.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("mailer error: {0}")]
    Mailer(String),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),
}

/// Trait for delivering low-stock alerts to administrators.
#[async_trait]
pub trait AlertMailer: Send + Sync {
    /// Sends one alert about one product to one recipient.
    async fn send_low_stock_alert(
        &self,
        recipient: &str,
        product_name: &str,
        remaining: u32,
        threshold: u32,
    ) -> Result<(), NotifierError>;
}

/// A captured alert, for assertions in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentAlert {
    pub recipient: String,
    pub product_name: String,
    pub remaining: u32,
    pub threshold: u32,
}

#[derive(Debug, Default)]
struct InMemoryMailerState {
    sent: Vec<SentAlert>,
    fail_next: u32,
}

/// In-memory mailer for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAlertMailer {
    state: Arc<RwLock<InMemoryMailerState>>,
}

impl InMemoryAlertMailer {
    /// Creates a new in-memory mailer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` send calls fail.
    pub fn fail_next(&self, n: u32) {
        self.state.write().unwrap().fail_next = n;
    }

    /// Returns the alerts sent so far.
    pub fn sent(&self) -> Vec<SentAlert> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns the number of alerts sent so far.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }
}

#[async_trait]
impl AlertMailer for InMemoryAlertMailer {
    async fn send_low_stock_alert(
        &self,
        recipient: &str,
        product_name: &str,
        remaining: u32,
        threshold: u32,
    ) -> Result<(), NotifierError> {
        let mut state = self.state.write().unwrap();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(NotifierError::Mailer("smtp unavailable".to_string()));
        }
        state.sent.push(SentAlert {
            recipient: recipient.to_string(),
            product_name: product_name.to_string(),
            remaining,
            threshold,
        });
        Ok(())
    }
}

/// Mailer that only logs. Default for local runs without SMTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAlertMailer;

#[async_trait]
impl AlertMailer for TracingAlertMailer {
    async fn send_low_stock_alert(
        &self,
        recipient: &str,
        product_name: &str,
        remaining: u32,
        threshold: u32,
    ) -> Result<(), NotifierError> {
        tracing::info!(
            recipient,
            product_name,
            remaining,
            threshold,
            "low-stock alert"
        );
        Ok(())
    }
}

/// Delivers low-stock alerts for the products flagged by a committed
/// checkout.
///
/// Each product's stock is re-read first so an alert is not raised on a
/// level a concurrent restock already corrected. Failures are caught
/// and logged per product; one failing product never suppresses the
/// alerts for the others.
pub async fn dispatch_low_stock_alerts<S, M>(store: &S, mailer: &M, flagged: &[StockAdjustment])
where
    S: FulfillmentStore,
    M: AlertMailer,
{
    if flagged.is_empty() {
        return;
    }

    let recipients = match store.admin_emails().await {
        Ok(recipients) => recipients,
        Err(err) => {
            tracing::warn!(error = %err, "could not resolve alert recipients");
            return;
        }
    };
    if recipients.is_empty() {
        return;
    }

    for adjustment in flagged {
        if let Err(err) = alert_one(store, mailer, &recipients, adjustment).await {
            tracing::warn!(
                product = %adjustment.product_name,
                error = %err,
                "low-stock alert failed"
            );
        }
    }
}

async fn alert_one<S, M>(
    store: &S,
    mailer: &M,
    recipients: &[String],
    adjustment: &StockAdjustment,
) -> Result<(), NotifierError>
where
    S: FulfillmentStore,
    M: AlertMailer,
{
    // Re-read live stock; a later sale or restock may have moved it.
    let Some(stock) = store.current_stock(adjustment.product_id).await? else {
        return Ok(());
    };
    if !inventory::is_low_stock(stock, adjustment.reorder_threshold) {
        return Ok(());
    }

    for recipient in recipients {
        mailer
            .send_low_stock_alert(
                recipient,
                &adjustment.product_name,
                stock,
                adjustment.reorder_threshold,
            )
            .await?;
    }
    metrics::counter!("low_stock_alerts_total").increment(1);
    Ok(())
}

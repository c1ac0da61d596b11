//! HTTP API server for the order fulfillment engine.
//!
//! Exposes checkout, card-payment confirmation, invoice download, and
//! delivery confirmation over REST, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use checkout::{
    AlertMailer, CheckoutCoordinator, CheckoutPolicy, InMemoryPaymentGateway, PaymentGateway,
    TracingAlertMailer,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::FulfillmentStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, G, M>(state: Arc<AppState<S, G, M>>, metrics_handle: PrometheusHandle) -> Router
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    M: AlertMailer + Clone + Send + Sync + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S, G, M>))
        .route("/orders/{id}", get(routes::orders::get::<S, G, M>))
        .route(
            "/orders/{id}/confirm-payment",
            post(routes::orders::confirm_payment::<S, G, M>),
        )
        .route(
            "/orders/{id}/invoice",
            get(routes::orders::invoice::<S, G, M>),
        )
        .route(
            "/orders/{id}/confirm-delivery",
            post(routes::orders::confirm_delivery::<S, G, M>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state over explicitly constructed dependencies.
pub fn create_state<S, G, M>(
    store: S,
    gateway: G,
    mailer: M,
    policy: CheckoutPolicy,
) -> Arc<AppState<S, G, M>>
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    M: AlertMailer + Clone + Send + Sync + 'static,
{
    Arc::new(AppState {
        coordinator: CheckoutCoordinator::new(store.clone(), gateway, mailer, policy),
        store,
    })
}

/// Creates the default application state: the given store, an
/// auto-capturing in-memory gateway, and a log-only alert mailer.
pub fn create_default_state<S>(
    store: S,
    policy: CheckoutPolicy,
) -> Arc<AppState<S, InMemoryPaymentGateway, TracingAlertMailer>>
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
{
    create_state(
        store,
        InMemoryPaymentGateway::with_auto_capture(),
        TracingAlertMailer,
        policy,
    )
}

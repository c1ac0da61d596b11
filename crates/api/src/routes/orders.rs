//! Order checkout, payment, invoice, and delivery endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use checkout::{
    AlertMailer, CheckoutCoordinator, CheckoutOutcome, CheckoutRequest, InvoiceDocument,
    PaymentGateway,
};
use common::{CartId, CustomerId, OrderId};
use domain::{Order, PaymentMethod};
use serde::{Deserialize, Serialize};
use store::{DeliverySettlement, FulfillmentStore};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S, G, M>
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    M: AlertMailer + Clone + Send + Sync + 'static,
{
    pub coordinator: CheckoutCoordinator<S, G, M>,
    pub store: S,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub cart_id: String,
    #[serde(default)]
    pub redeem_points: bool,
    pub payment_method: String,
    #[serde(default)]
    pub home_delivery: bool,
    pub delivery_address: Option<String>,
}

#[derive(Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_intent_id: String,
}

#[derive(Deserialize)]
pub struct ConfirmDeliveryRequest {
    pub amount_collected_cents: i64,
    pub method: String,
    pub carrier_name: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub payment_required: bool,
    pub order_id: String,
    pub amount_due_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

#[derive(Serialize)]
pub struct DeliveryResponse {
    pub id: String,
    pub status: String,
    pub carrier: Option<String>,
    pub settlement_note: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub cart_id: String,
    pub customer_id: String,
    pub total_cents: i64,
    pub discount_cents: i64,
    pub delivery_fee_cents: i64,
    pub amount_due_cents: i64,
    pub points_earned: i64,
    pub points_redeemed: i64,
    pub delivery_date: String,
    pub created_at: String,
    pub delivery: DeliveryResponse,
}

#[derive(Serialize)]
pub struct ConfirmDeliveryResponse {
    pub order_id: String,
    pub delivery_id: String,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        OrderResponse {
            id: order.id.to_string(),
            cart_id: order.cart_id.to_string(),
            customer_id: order.customer_id.to_string(),
            total_cents: order.total.cents(),
            discount_cents: order.discount.cents(),
            delivery_fee_cents: order.delivery_fee.cents(),
            amount_due_cents: order.amount_due.cents(),
            points_earned: order.points_earned,
            points_redeemed: order.points_redeemed,
            delivery_date: order.delivery_date.to_rfc3339(),
            created_at: order.created_at.to_rfc3339(),
            delivery: DeliveryResponse {
                id: order.delivery.id.to_string(),
                status: order.delivery.status.to_string(),
                carrier: order.delivery.carrier.clone(),
                settlement_note: order.delivery.settlement_note.clone(),
            },
        }
    }
}

// -- Handlers --

/// POST /orders — convert a cart into a committed order.
#[tracing::instrument(skip(state, req))]
pub async fn create<S, G, M>(
    State(state): State<Arc<AppState<S, G, M>>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError>
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    M: AlertMailer + Clone + Send + Sync + 'static,
{
    let cart_id = parse_id::<CartId>(&req.cart_id, "cart_id")?;
    let payment_method = PaymentMethod::parse(&req.payment_method).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "payment_method must be \"cash\" or \"card\", got {:?}",
            req.payment_method
        ))
    })?;

    let outcome = state
        .coordinator
        .checkout(CheckoutRequest {
            cart_id,
            redeem_points: req.redeem_points,
            payment_method,
            home_delivery: req.home_delivery,
            delivery_address: req.delivery_address,
        })
        .await?;

    let response = match outcome {
        CheckoutOutcome::CashDue { order } => CheckoutResponse {
            payment_required: false,
            order_id: order.id.to_string(),
            amount_due_cents: order.amount_due.cents(),
            redirect_url: None,
        },
        CheckoutOutcome::CardRedirect {
            order,
            redirect_url,
            ..
        } => CheckoutResponse {
            payment_required: true,
            order_id: order.id.to_string(),
            amount_due_cents: order.amount_due.cents(),
            redirect_url: Some(redirect_url),
        },
    };

    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders/{id} — load an order with its delivery.
#[tracing::instrument(skip(state))]
pub async fn get<S, G, M>(
    State(state): State<Arc<AppState<S, G, M>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    M: AlertMailer + Clone + Send + Sync + 'static,
{
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    let order = state
        .store
        .get_order(order_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("order {id} not found")))?;

    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/confirm-payment — reconcile a card capture and
/// download the invoice.
#[tracing::instrument(skip(state, req))]
pub async fn confirm_payment<S, G, M>(
    State(state): State<Arc<AppState<S, G, M>>>,
    Path(id): Path<String>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<Response, ApiError>
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    M: AlertMailer + Clone + Send + Sync + 'static,
{
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    if req.payment_intent_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "payment_intent_id is required".to_string(),
        ));
    }

    let confirmed = state
        .coordinator
        .confirm_card_payment(order_id, &req.payment_intent_id)
        .await?;

    Ok(document_response(confirmed.invoice))
}

/// GET /orders/{id}/invoice — download the invoice, owner only.
#[tracing::instrument(skip(state, headers))]
pub async fn invoice<S, G, M>(
    State(state): State<Arc<AppState<S, G, M>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError>
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    M: AlertMailer + Clone + Send + Sync + 'static,
{
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    let requester = headers
        .get("X-Customer-Id")
        .and_then(|hdr| hdr.to_str().ok())
        .and_then(|value| uuid::Uuid::parse_str(value).ok())
        .map(CustomerId::from_uuid)
        .ok_or_else(|| {
            ApiError::BadRequest("missing or invalid X-Customer-Id header".to_string())
        })?;

    let document = state.coordinator.invoice_for(order_id, requester).await?;
    Ok(document_response(document))
}

/// POST /orders/{id}/confirm-delivery — finalize the delivery; for
/// cash settlements this creates the paid payment record.
#[tracing::instrument(skip(state, req))]
pub async fn confirm_delivery<S, G, M>(
    State(state): State<Arc<AppState<S, G, M>>>,
    Path(id): Path<String>,
    Json(req): Json<ConfirmDeliveryRequest>,
) -> Result<Json<ConfirmDeliveryResponse>, ApiError>
where
    S: FulfillmentStore + Clone + Send + Sync + 'static,
    G: PaymentGateway + Send + Sync + 'static,
    M: AlertMailer + Clone + Send + Sync + 'static,
{
    let order_id = parse_id::<OrderId>(&id, "order id")?;
    let method = PaymentMethod::parse(&req.method).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "method must be \"cash\" or \"card\", got {:?}",
            req.method
        ))
    })?;

    let (order_id, delivery_id) = state
        .coordinator
        .confirm_delivery(
            order_id,
            DeliverySettlement {
                amount_collected: common::Money::from_cents(req.amount_collected_cents),
                method,
                carrier: req.carrier_name,
            },
        )
        .await?;

    Ok(Json(ConfirmDeliveryResponse {
        order_id: order_id.to_string(),
        delivery_id: delivery_id.to_string(),
    }))
}

fn parse_id<T: From<uuid::Uuid>>(value: &str, what: &str) -> Result<T, ApiError> {
    uuid::Uuid::parse_str(value)
        .map(T::from)
        .map_err(|e| ApiError::BadRequest(format!("invalid {what}: {e}")))
}

fn document_response(document: InvoiceDocument) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, document.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", document.filename),
            ),
        ],
        document.bytes,
    )
        .into_response()
}

use crate::{
    errors::ServiceError,
    handlers::{
        common::created_response,
        session::{clear_session_cookie, session_token},
    },
    services::orders::{price_items, CreateOrderRequest, OrderResponse},
    AppState,
};
use axum::{
    extract::{Json, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/payment-intent", post(create_payment_intent))
}

/// Convert the session's cart into an order.
///
/// The session cookie is cleared only after the engine reports success, so a
/// failed checkout leaves the cart intact for retry.
#[utoipa::path(
    post,
    path = "/checkout",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Empty cart or invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock, names the SKU", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn checkout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let token = session_token(&headers).ok_or(ServiceError::EmptyCart)?;
    let site = state.sites.resolve(host_of(&headers).as_deref());

    let details = state
        .services
        .orders
        .create_from_cart(&site, &token, payload)
        .await?;

    let mut response = created_response(OrderResponse::from(details));
    response
        .headers_mut()
        .insert(header::SET_COOKIE, clear_session_cookie());

    Ok(response)
}

/// Create a payment intent for the current cart
#[utoipa::path(
    post,
    path = "/payment-intent",
    request_body = PaymentIntentRequest,
    responses(
        (status = 200, description = "Intent created", body = PaymentIntentResponse),
        (status = 400, description = "Empty cart", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment provider rejected the request", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_payment_intent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<PaymentIntentRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let token = session_token(&headers).ok_or(ServiceError::EmptyCart)?;
    let site = state.sites.resolve(host_of(&headers).as_deref());

    let cart = state.services.cart.get_or_create(&token).await?;
    if cart.items.is_empty() {
        return Err(ServiceError::EmptyCart);
    }

    let pricing = price_items(&cart.items, &site);

    // Customer resolution enriches the intent with the provider-side
    // customer, but never blocks it.
    let customer = match payload.as_ref().and_then(|p| p.email.as_deref()) {
        Some(email) => match state.services.customers.get_or_create(email, "", "").await {
            Ok(customer) => Some(customer),
            Err(e) => {
                warn!("Customer resolution failed for payment intent: {}", e);
                None
            }
        },
        None => None,
    };

    let intent = state
        .services
        .payments
        .create_payment_intent(
            pricing.total_minor_units()?,
            &site.currency,
            customer
                .as_ref()
                .and_then(|c| c.payment_provider_ref.as_deref()),
        )
        .await?;

    if let (Some(customer), Some(provider_ref)) = (&customer, &intent.customer_ref) {
        if customer.payment_provider_ref.is_none() {
            if let Err(e) = state
                .services
                .customers
                .link_payment_provider_ref(customer.id, provider_ref)
                .await
            {
                warn!("Failed to link payment provider customer: {}", e);
            }
        }
    }

    Ok(Json(PaymentIntentResponse {
        client_secret: intent.client_secret,
        payment_intent_id: intent.intent_id,
        amount: pricing.total_minor_units()?,
        subtotal: pricing.subtotal,
        tax: pricing.tax,
        shipping: pricing.shipping,
        currency: site.currency,
    }))
}

fn host_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

// Request/response DTOs

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentIntentRequest {
    /// Attach the intent to this customer's provider record when present
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
    /// Total in minor units, as sent to the provider
    pub amount: i64,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub currency: String,
}

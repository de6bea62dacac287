use crate::{
    errors::ServiceError,
    services::payments::{parse_webhook_event, verify_webhook_signature},
    AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Creates the router for the inbound payment webhook
pub fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/payment", post(payment_webhook))
}

/// Inbound payment-provider webhook.
///
/// Signature verification happens before anything else; an unverifiable
/// delivery never reaches order mutation. Once a delivery is verified and
/// structurally valid it is acknowledged with 200 no matter what downstream
/// processing finds; a missed order lookup or a storage error must not make
/// the provider retry an event that was durably received.
#[utoipa::path(
    post,
    path = "/webhook/payment",
    request_body = String,
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Malformed payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let verified = verify_webhook_signature(
        &headers,
        &body,
        &state.config.payment_webhook_secret,
        state.config.payment_webhook_tolerance_secs,
    );
    if !verified {
        warn!("Payment webhook signature verification failed");
        return Err(ServiceError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }

    let json: Value = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::BadRequest(format!("Invalid JSON payload: {}", e)))?;

    let Some(event) = parse_webhook_event(&json)? else {
        info!(
            event_type = json.get("type").and_then(serde_json::Value::as_str).unwrap_or(""),
            "Unhandled payment webhook type, acknowledging"
        );
        return Ok((StatusCode::OK, "ignored"));
    };

    match state
        .services
        .order_status
        .apply_payment_event(&event.payment_intent_id, event.new_status)
        .await
    {
        Ok(Some(order)) => {
            info!(
                order_number = %order.order_number,
                status = %order.payment_status.as_str(),
                "Payment event applied"
            );
        }
        Ok(None) => {
            // Logged and dropped inside the state machine; still a 200.
        }
        Err(e) => {
            // The event is verified and well-formed; a storage hiccup here is
            // our problem, not the provider's. Acknowledge anyway.
            error!(
                payment_intent_id = %event.payment_intent_id,
                "Failed to apply payment event: {}", e
            );
        }
    }

    Ok((StatusCode::OK, "ok"))
}

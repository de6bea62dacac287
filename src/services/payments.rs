use crate::{entities::order::PaymentStatus, errors::ServiceError};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// An in-progress charge attempt at the payment provider.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: String,
    /// Provider-side customer reference, when the provider attached one
    pub customer_ref: Option<String>,
}

/// Narrow contract to the external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        customer_ref: Option<&str>,
    ) -> Result<PaymentIntent, ServiceError>;
}

/// Stripe-shaped HTTP gateway. The base URL is configurable so tests and
/// sandboxes can point it anywhere.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayIntentResponse {
    id: String,
    client_secret: String,
    customer: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, secret_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url,
            secret_key,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_payment_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        customer_ref: Option<&str>,
    ) -> Result<PaymentIntent, ServiceError> {
        let secret_key = self.secret_key.as_deref().ok_or_else(|| {
            ServiceError::PaymentFailed("Payment provider is not configured".to_string())
        })?;

        let amount = amount_minor_units.to_string();
        let currency = currency.to_lowercase();
        let mut form: Vec<(&str, &str)> =
            vec![("amount", amount.as_str()), ("currency", currency.as_str())];
        if let Some(customer) = customer_ref {
            form.push(("customer", customer));
        }

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.base_url))
            .bearer_auth(secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("Payment provider unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::PaymentFailed(format!(
                "Payment provider returned {}: {}",
                status, body
            )));
        }

        let intent: GatewayIntentResponse = response.json().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Malformed provider response: {}", e))
        })?;

        Ok(PaymentIntent {
            intent_id: intent.id,
            client_secret: intent.client_secret,
            customer_ref: intent.customer,
        })
    }
}

/// Computes the hex HMAC-SHA256 over `"{timestamp}.{payload}"`, the signing
/// scheme shared by both accepted header formats.
pub fn sign_payload(secret: &str, timestamp: &str, payload: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a webhook delivery's signature.
///
/// Accepts the provider's `Stripe-Signature: t=..,v1=..` header or the
/// generic `x-timestamp`/`x-signature` pair. Verification is mandatory: there
/// is no unsigned path, and a stale timestamp outside `tolerance_secs` fails
/// even with a valid MAC.
pub fn verify_webhook_signature(
    headers: &HeaderMap,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
) -> bool {
    if let (Some(ts), Some(sig)) = (headers.get("x-timestamp"), headers.get("x-signature")) {
        if let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) {
            return verify_parts(ts, sig, payload, secret, tolerance_secs);
        }
    }

    if let Some(header) = headers.get("stripe-signature").and_then(|h| h.to_str().ok()) {
        let mut ts = "";
        let mut v1 = "";
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => ts = value,
                Some(("v1", value)) => v1 = value,
                _ => {}
            }
        }
        if !ts.is_empty() && !v1.is_empty() {
            return verify_parts(ts, v1, payload, secret, tolerance_secs);
        }
    }

    false
}

fn verify_parts(
    timestamp: &str,
    signature: &str,
    payload: &[u8],
    secret: &str,
    tolerance_secs: i64,
) -> bool {
    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    if (Utc::now().timestamp() - ts).abs() > tolerance_secs {
        warn!("Webhook timestamp outside tolerance window");
        return false;
    }

    let expected = sign_payload(secret, timestamp, payload);
    constant_time_eq(&expected, signature)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// A verified, parsed payment-provider event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentWebhookEvent {
    pub event_id: Option<String>,
    pub event_type: String,
    pub payment_intent_id: String,
    pub new_status: PaymentStatus,
}

/// Maps a provider event body to an order-status transition.
///
/// Returns `Ok(None)` for event types this system does not track (they are
/// acknowledged and ignored). A tracked event type without an intent
/// reference is malformed and rejected.
pub fn parse_webhook_event(json: &Value) -> Result<Option<PaymentWebhookEvent>, ServiceError> {
    let event_type = json
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ServiceError::BadRequest("Event has no type".to_string()))?;

    let new_status = match event_type {
        "payment_intent.succeeded" => PaymentStatus::Paid,
        "payment_intent.payment_failed" => PaymentStatus::Failed,
        "charge.refunded" => PaymentStatus::Refunded,
        _ => return Ok(None),
    };

    let object = json
        .get("data")
        .and_then(|d| d.get("object"))
        .ok_or_else(|| ServiceError::BadRequest("Event has no data.object".to_string()))?;

    // payment_intent.* events carry the intent as the object itself; charge
    // events reference it by field.
    let payment_intent_id = if event_type.starts_with("payment_intent.") {
        object.get("id").and_then(Value::as_str)
    } else {
        object.get("payment_intent").and_then(Value::as_str)
    }
    .ok_or_else(|| {
        ServiceError::BadRequest("Event carries no payment intent reference".to_string())
    })?;

    Ok(Some(PaymentWebhookEvent {
        event_id: json.get("id").and_then(Value::as_str).map(str::to_string),
        event_type: event_type.to_string(),
        payment_intent_id: payment_intent_id.to_string(),
        new_status,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test_0123456789";

    fn signed_headers(payload: &[u8], secret: &str) -> HeaderMap {
        let ts = Utc::now().timestamp().to_string();
        let sig = sign_payload(secret, &ts, payload);
        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", ts.parse().unwrap());
        headers.insert("x-signature", sig.parse().unwrap());
        headers
    }

    #[test]
    fn accepts_valid_generic_signature() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let headers = signed_headers(payload, SECRET);

        assert!(verify_webhook_signature(&headers, payload, SECRET, 300));
    }

    #[test]
    fn accepts_valid_stripe_style_signature() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let ts = Utc::now().timestamp().to_string();
        let sig = sign_payload(SECRET, &ts, payload);
        let mut headers = HeaderMap::new();
        headers.insert(
            "stripe-signature",
            format!("t={},v1={}", ts, sig).parse().unwrap(),
        );

        assert!(verify_webhook_signature(&headers, payload, SECRET, 300));
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = br#"{"amount":100}"#;
        let headers = signed_headers(payload, SECRET);

        assert!(!verify_webhook_signature(
            &headers,
            br#"{"amount":999}"#,
            SECRET,
            300
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = br#"{"amount":100}"#;
        let headers = signed_headers(payload, "whsec_other_secret");

        assert!(!verify_webhook_signature(&headers, payload, SECRET, 300));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = br#"{}"#;
        let ts = (Utc::now().timestamp() - 4000).to_string();
        let sig = sign_payload(SECRET, &ts, payload);
        let mut headers = HeaderMap::new();
        headers.insert("x-timestamp", ts.parse().unwrap());
        headers.insert("x-signature", sig.parse().unwrap());

        assert!(!verify_webhook_signature(&headers, payload, SECRET, 300));
    }

    #[test]
    fn rejects_unsigned_delivery() {
        // No fallback to unsigned parsing, ever
        assert!(!verify_webhook_signature(
            &HeaderMap::new(),
            br#"{}"#,
            SECRET,
            300
        ));
    }

    #[test]
    fn parses_intent_succeeded() {
        let event = json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_123", "object": "payment_intent"}}
        });

        let parsed = parse_webhook_event(&event).unwrap().unwrap();
        assert_eq!(parsed.payment_intent_id, "pi_123");
        assert_eq!(parsed.new_status, PaymentStatus::Paid);
        assert_eq!(parsed.event_id.as_deref(), Some("evt_1"));
    }

    #[test]
    fn parses_charge_refunded_via_intent_reference() {
        let event = json!({
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_9", "payment_intent": "pi_123"}}
        });

        let parsed = parse_webhook_event(&event).unwrap().unwrap();
        assert_eq!(parsed.payment_intent_id, "pi_123");
        assert_eq!(parsed.new_status, PaymentStatus::Refunded);
    }

    #[test]
    fn unhandled_event_types_are_ignored_not_errors() {
        let event = json!({
            "type": "customer.created",
            "data": {"object": {"id": "cus_1"}}
        });

        assert!(parse_webhook_event(&event).unwrap().is_none());
    }

    #[test]
    fn tracked_event_without_intent_is_malformed() {
        let event = json!({
            "type": "payment_intent.succeeded",
            "data": {"object": {}}
        });

        assert!(matches!(
            parse_webhook_event(&event),
            Err(ServiceError::BadRequest(_))
        ));
    }
}

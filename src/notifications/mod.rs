use crate::entities::order;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{error, info};

type HmacSha256 = Hmac<Sha256>;

/// Payload posted to the configured confirmation endpoint when an order
/// transitions to paid.
#[derive(Debug, Serialize)]
pub struct OrderConfirmation {
    pub order_number: String,
    pub email: String,
    pub currency: String,
    pub total: Decimal,
    pub paid_at: String,
}

impl From<&order::Model> for OrderConfirmation {
    fn from(order: &order::Model) -> Self {
        Self {
            order_number: order.order_number.clone(),
            email: order.email.clone(),
            currency: order.currency.clone(),
            total: order.total,
            paid_at: Utc::now().to_rfc3339(),
        }
    }
}

/// Dispatches order-confirmation notifications as signed HTTP POSTs.
///
/// Callers fire this from a spawned task: delivery failure is logged and
/// never propagated, so a slow or dead endpoint cannot delay the webhook
/// acknowledgment that triggered it.
#[derive(Debug, Clone)]
pub struct OrderNotifier {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
}

impl OrderNotifier {
    pub fn new(url: String, secret: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            url,
            secret,
        }
    }

    /// Posts the confirmation payload. Errors are logged, not returned.
    pub async fn send_order_confirmation(&self, order: &order::Model) {
        let payload = OrderConfirmation::from(order);

        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                error!(order_number = %order.order_number, "Failed to serialize confirmation: {}", e);
                return;
            }
        };

        let timestamp = Utc::now().timestamp().to_string();
        let mut request = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .header("x-timestamp", &timestamp);

        if let Some(secret) = &self.secret {
            request = request.header("x-signature", sign(secret, &timestamp, &body));
        }

        match request.body(body).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(
                    order_number = %order.order_number,
                    "Order confirmation dispatched"
                );
            }
            Ok(resp) => {
                error!(
                    order_number = %order.order_number,
                    status = %resp.status(),
                    "Order confirmation rejected by endpoint"
                );
            }
            Err(e) => {
                error!(
                    order_number = %order.order_number,
                    "Order confirmation dispatch failed: {}", e
                );
            }
        }
    }
}

fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_hex() {
        let a = sign("secret", "1700000000", b"{\"order_number\":\"ORD-1\"}");
        let b = sign("secret", "1700000000", b"{\"order_number\":\"ORD-1\"}");

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_varies_with_secret_and_body() {
        let base = sign("secret", "1700000000", b"payload");
        assert_ne!(base, sign("other", "1700000000", b"payload"));
        assert_ne!(base, sign("secret", "1700000000", b"payload2"));
        assert_ne!(base, sign("secret", "1700000001", b"payload"));
    }
}

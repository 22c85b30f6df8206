use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment gateway is not configured")]
    NotConfigured,
    #[error("Amount must be a positive number of minor currency units")]
    InvalidAmount,
    #[error("Payment provider error: {0}")]
    Provider(String),
    #[error("Webhook signature verification failed")]
    InvalidSignature,
    #[error("Malformed webhook payload")]
    MalformedPayload,
    #[error("Payment provider request failed: {0}")]
    Network(#[from] reqwest::Error),
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            PaymentError::NotConfigured => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Payment gateway error")
            }
            PaymentError::InvalidAmount => (StatusCode::BAD_REQUEST, "Invalid amount"),
            PaymentError::Provider(_) => (StatusCode::BAD_REQUEST, "Payment provider error"),
            PaymentError::InvalidSignature => (StatusCode::BAD_REQUEST, "Invalid signature"),
            PaymentError::MalformedPayload => (StatusCode::BAD_REQUEST, "Malformed payload"),
            PaymentError::Network(_) => (StatusCode::BAD_GATEWAY, "Payment provider unreachable"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub base_url: String,
}

/// A payment intent as returned to our clients: the id for later
/// reconciliation and the single-delivery client secret the payer uses to
/// confirm the charge directly against the provider.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
}

/// Parsed webhook event. Unknown kinds are preserved so the receiver can
/// acknowledge them without acting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    PaymentSucceeded { intent_id: String },
    PaymentMethodAttached,
    Ignored { kind: String },
}

#[cfg(feature = "demo-payments")]
#[derive(Debug, Clone, Serialize)]
pub struct DemoPayment {
    pub payment_id: String,
    pub status: crate::models::PaymentStatus,
}

#[derive(Debug, Deserialize)]
struct ProviderIntent {
    id: String,
    amount: i64,
    currency: String,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetails {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(rename = "type")]
    kind: String,
    data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: Option<String>,
}

/// Thin wrapper over the external card-payment provider. Creates payment
/// intents and parses webhook deliveries; it never sees card data and knows
/// nothing about bookings.
#[derive(Clone)]
pub struct PaymentGatewayService {
    client: Client,
    config: Option<GatewayConfig>,
}

impl PaymentGatewayService {
    pub fn new(config: Option<GatewayConfig>) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Create a payment intent with the provider. `amount_cents` is in minor
    /// currency units.
    pub async fn create_intent(
        &self,
        amount_cents: i64,
        currency: &str,
        metadata: &[(&str, String)],
    ) -> Result<PaymentIntent, PaymentError> {
        if amount_cents <= 0 {
            return Err(PaymentError::InvalidAmount);
        }

        let config = self.config.as_ref().ok_or(PaymentError::NotConfigured)?;

        let mut params: Vec<(String, String)> = vec![
            ("amount".to_string(), amount_cents.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        for (key, value) in metadata {
            params.push((format!("metadata[{key}]"), value.clone()));
        }

        let response = self
            .client
            .post(format!("{}/payment_intents", config.base_url))
            .basic_auth(&config.secret_key, None::<&str>)
            .form(&params)
            .send()
            .await?;

        if response.status().is_success() {
            let intent: ProviderIntent = response
                .json()
                .await
                .map_err(|_| PaymentError::Provider("unparseable provider response".to_string()))?;

            let client_secret = intent.client_secret.ok_or_else(|| {
                PaymentError::Provider("provider response missing client secret".to_string())
            })?;

            tracing::info!(intent_id = %intent.id, amount = intent.amount, "created payment intent");

            Ok(PaymentIntent {
                intent_id: intent.id,
                client_secret,
                amount: intent.amount,
                currency: intent.currency,
            })
        } else {
            let message = match response.json::<ProviderErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => "provider rejected the request".to_string(),
            };
            Err(PaymentError::Provider(message))
        }
    }

    /// Verify and parse an asynchronous webhook delivery. The signature is an
    /// HMAC over the raw, unparsed body; parsing happens only after the
    /// signature checks out.
    pub fn parse_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, PaymentError> {
        let config = self.config.as_ref().ok_or(PaymentError::NotConfigured)?;

        verify_webhook_signature(payload, signature_header, &config.webhook_secret)?;

        let parsed: WebhookPayload =
            serde_json::from_slice(payload).map_err(|_| PaymentError::MalformedPayload)?;

        let event = match parsed.kind.as_str() {
            "payment_intent.succeeded" => {
                let intent_id = parsed
                    .data
                    .and_then(|d| d.object.id)
                    .ok_or(PaymentError::MalformedPayload)?;
                WebhookEvent::PaymentSucceeded { intent_id }
            }
            "payment_method.attached" => WebhookEvent::PaymentMethodAttached,
            other => {
                tracing::debug!(kind = other, "ignoring unhandled webhook event");
                WebhookEvent::Ignored {
                    kind: other.to_string(),
                }
            }
        };

        Ok(event)
    }

    /// No-charge payment for trial flows. Bypasses the provider entirely.
    #[cfg(feature = "demo-payments")]
    pub fn create_demo_payment(&self, amount_cents: i64) -> Result<DemoPayment, PaymentError> {
        if amount_cents <= 0 {
            return Err(PaymentError::InvalidAmount);
        }

        Ok(DemoPayment {
            payment_id: format!("demo_{}", uuid::Uuid::new_v4()),
            status: crate::models::PaymentStatus::Completed,
        })
    }
}

/// Check the `t=<timestamp>,v1=<hex hmac>` signature header against an
/// HMAC-SHA256 of `"{timestamp}.{body}"`.
fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
) -> Result<(), PaymentError> {
    let mut timestamp: Option<&str> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in signature_header.split(',') {
        if let Some(value) = part.trim().strip_prefix("t=") {
            timestamp = Some(value);
        } else if let Some(value) = part.trim().strip_prefix("v1=") {
            candidates.push(value);
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::InvalidSignature)?;
    if candidates.is_empty() {
        return Err(PaymentError::InvalidSignature);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| PaymentError::InvalidSignature)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if candidates.iter().any(|candidate| *candidate == expected) {
        Ok(())
    } else {
        Err(PaymentError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const WEBHOOK_SECRET: &str = "whsec_test_secret";

    fn test_gateway() -> PaymentGatewayService {
        PaymentGatewayService::new(Some(GatewayConfig {
            secret_key: "sk_test_key".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            base_url: "http://localhost:12111".to_string(),
        }))
    }

    fn sign(payload: &[u8], secret: &str, timestamp: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_webhook_parses_payment_succeeded() {
        let gateway = test_gateway();
        let payload =
            br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;
        let header = sign(payload, WEBHOOK_SECRET, "1700000000");

        let event = gateway.parse_webhook(payload, &header).unwrap();

        assert_eq!(
            event,
            WebhookEvent::PaymentSucceeded {
                intent_id: "pi_123".to_string()
            }
        );
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let gateway = test_gateway();
        let payload =
            br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_123"}}}"#;
        let header = sign(payload, WEBHOOK_SECRET, "1700000000");
        let tampered =
            br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_456"}}}"#;

        assert_matches!(
            gateway.parse_webhook(tampered, &header),
            Err(PaymentError::InvalidSignature)
        );
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let gateway = test_gateway();
        let payload = br#"{"type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let header = sign(payload, "whsec_other", "1700000000");

        assert_matches!(
            gateway.parse_webhook(payload, &header),
            Err(PaymentError::InvalidSignature)
        );
    }

    #[test]
    fn test_malformed_signature_header_is_rejected() {
        let gateway = test_gateway();
        let payload = br#"{"type":"payment_intent.succeeded"}"#;

        assert_matches!(
            gateway.parse_webhook(payload, "garbage"),
            Err(PaymentError::InvalidSignature)
        );
        assert_matches!(
            gateway.parse_webhook(payload, "t=1700000000"),
            Err(PaymentError::InvalidSignature)
        );
    }

    #[test]
    fn test_unknown_event_kind_is_ignored_not_an_error() {
        let gateway = test_gateway();
        let payload = br#"{"type":"charge.refunded","data":{"object":{"id":"re_1"}}}"#;
        let header = sign(payload, WEBHOOK_SECRET, "1700000000");

        let event = gateway.parse_webhook(payload, &header).unwrap();

        assert_eq!(
            event,
            WebhookEvent::Ignored {
                kind: "charge.refunded".to_string()
            }
        );
    }

    #[test]
    fn test_payment_method_attached_is_informational() {
        let gateway = test_gateway();
        let payload = br#"{"type":"payment_method.attached","data":{"object":{"id":"pm_1"}}}"#;
        let header = sign(payload, WEBHOOK_SECRET, "1700000000");

        let event = gateway.parse_webhook(payload, &header).unwrap();

        assert_eq!(event, WebhookEvent::PaymentMethodAttached);
    }

    #[tokio::test]
    async fn test_create_intent_rejects_non_positive_amounts() {
        let gateway = test_gateway();

        assert_matches!(
            gateway.create_intent(0, "usd", &[]).await,
            Err(PaymentError::InvalidAmount)
        );
        assert_matches!(
            gateway.create_intent(-2500, "usd", &[]).await,
            Err(PaymentError::InvalidAmount)
        );
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_fails_fast() {
        let gateway = PaymentGatewayService::new(None);

        assert_matches!(
            gateway.create_intent(2500, "usd", &[]).await,
            Err(PaymentError::NotConfigured)
        );
    }

    #[cfg(feature = "demo-payments")]
    #[test]
    fn test_demo_payment_succeeds_without_provider() {
        let gateway = PaymentGatewayService::new(None);

        let payment = gateway.create_demo_payment(2500).unwrap();

        assert!(payment.payment_id.starts_with("demo_"));
        assert_eq!(payment.status, crate::models::PaymentStatus::Completed);

        assert_matches!(
            gateway.create_demo_payment(0),
            Err(PaymentError::InvalidAmount)
        );
    }
}

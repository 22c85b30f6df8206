use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trainhub::services::{GatewayConfig, PaymentError, PaymentGatewayService};

fn gateway(base_url: String) -> PaymentGatewayService {
    PaymentGatewayService::new(Some(GatewayConfig {
        secret_key: "sk_test_key".to_string(),
        webhook_secret: "whsec_test".to_string(),
        base_url,
    }))
}

#[tokio::test]
async fn test_create_intent_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .and(header_exists("authorization"))
        .and(body_string_contains("amount=2500"))
        .and(body_string_contains("currency=usd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_test_123",
            "amount": 2500,
            "currency": "usd",
            "status": "requires_confirmation",
            "client_secret": "pi_test_123_secret_xyz"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(server.uri());

    let intent = gateway
        .create_intent(2500, "USD", &[("user_id", "u-1".to_string())])
        .await
        .unwrap();

    assert_eq!(intent.intent_id, "pi_test_123");
    assert_eq!(intent.client_secret, "pi_test_123_secret_xyz");
    assert_eq!(intent.amount, 2500);
    assert_eq!(intent.currency, "usd");
}

#[tokio::test]
async fn test_create_intent_surfaces_provider_rejection() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "message": "Your card was declined.",
                "type": "card_error"
            }
        })))
        .mount(&server)
        .await;

    let gateway = gateway(server.uri());

    let err = gateway.create_intent(2500, "usd", &[]).await.unwrap_err();
    assert_matches!(err, PaymentError::Provider(message) if message.contains("declined"));
}

#[tokio::test]
async fn test_create_intent_with_unparseable_success_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let gateway = gateway(server.uri());

    assert_matches!(
        gateway.create_intent(2500, "usd", &[]).await,
        Err(PaymentError::Provider(_))
    );
}

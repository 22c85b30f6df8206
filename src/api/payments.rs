use axum::{
    extract::State,
    http::HeaderMap,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::post,
    Extension, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::auth::{jwt_auth_middleware, AuthService, UserSession};
use crate::services::{BookingService, PaymentError, PaymentGatewayService};

#[derive(Clone)]
pub struct PaymentsApiState {
    pub gateway: PaymentGatewayService,
    pub bookings: BookingService,
}

/// Payment routes: intent creation (authenticated) and the provider webhook
/// (raw body, signature-authenticated).
pub fn payment_routes(
    gateway: PaymentGatewayService,
    bookings: BookingService,
    auth_service: AuthService,
) -> Router {
    let state = PaymentsApiState { gateway, bookings };

    Router::new()
        .route(
            "/create-payment-intent",
            post(create_payment_intent).route_layer(middleware::from_fn_with_state(
                auth_service,
                jwt_auth_middleware,
            )),
        )
        .route("/webhook", post(webhook))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CreateIntentRequest {
    /// Amount in minor currency units.
    amount: i64,
    currency: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateIntentResponse {
    client_secret: String,
    payment_intent_id: String,
    amount: i64,
    currency: String,
}

/// Create a payment intent for the caller. The client confirms the charge
/// directly against the provider using the returned secret.
#[tracing::instrument(skip(state, request))]
async fn create_payment_intent(
    State(state): State<PaymentsApiState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, PaymentError> {
    let currency = request.currency.as_deref().unwrap_or("usd");
    let metadata = [("user_id", session.user_id.to_string())];

    let intent = state
        .gateway
        .create_intent(request.amount, currency, &metadata)
        .await?;

    Ok(Json(CreateIntentResponse {
        client_secret: intent.client_secret,
        payment_intent_id: intent.intent_id,
        amount: intent.amount,
        currency: intent.currency,
    }))
}

/// Provider webhook receiver. Fast and idempotent: signature failures are
/// 400 (terminal), reconciliation failures are non-2xx so the provider
/// retries, everything else acknowledges with 200 even when ignored.
async fn webhook(
    State(state): State<PaymentsApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let event = match state.gateway.parse_webhook(&body, signature) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("webhook rejected: {e}");
            return e.into_response();
        }
    };

    if let Err(e) = state.bookings.reconcile_from_webhook(&event).await {
        tracing::error!("webhook reconciliation failed: {e}");
        return e.into_response();
    }

    Json(serde_json::json!({ "received": true })).into_response()
}

use axum::{routing::get, Router};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::admin::admin_routes;
use super::auth::auth_routes;
use super::bookings::booking_routes;
use super::health::health_check;
use super::payments::payment_routes;
use super::reviews::review_routes;
use super::sessions::session_routes;
use super::trainers::trainer_routes;
use crate::auth::{cors_layer, security_headers_layer, AuthService};
use crate::config::AppConfig;
use crate::services::{
    BookingService, EmailService, GatewayConfig, PaymentGatewayService, ReviewService,
    SessionService, TrainerService, VerificationService,
};

/// Wire services together and build the application router.
pub fn create_routes(db: PgPool, config: &AppConfig) -> Router {
    let mailer = EmailService::new(config.smtp.clone(), config.ops_email.clone());

    let gateway_config = match (&config.gateway_secret_key, &config.gateway_webhook_secret) {
        (Some(secret_key), Some(webhook_secret)) => Some(GatewayConfig {
            secret_key: secret_key.clone(),
            webhook_secret: webhook_secret.clone(),
            base_url: config.gateway_api_base.clone(),
        }),
        _ => None,
    };
    let gateway = PaymentGatewayService::new(gateway_config);

    let verification = VerificationService::new(
        db.clone(),
        &config.decision_link_secret,
        config.trainer_cooldown_days,
        mailer.clone(),
        config.app_url.clone(),
    );
    let auth_service = AuthService::new(
        db.clone(),
        &config.jwt_secret,
        verification.clone(),
        mailer,
        config.app_url.clone(),
    );
    let bookings = BookingService::new(db.clone());
    let sessions = SessionService::new(db.clone());
    let reviews = ReviewService::new(db.clone());
    let trainers = TrainerService::new(db);

    Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/auth",
            auth_routes(auth_service.clone(), verification.clone()),
        )
        .nest("/api/trainers", trainer_routes(trainers))
        .nest(
            "/api/payments",
            payment_routes(gateway.clone(), bookings.clone(), auth_service.clone()),
        )
        .nest(
            "/api/bookings",
            booking_routes(bookings, gateway, auth_service.clone()),
        )
        .nest("/api/sessions", session_routes(sessions, auth_service.clone()))
        .nest("/api/reviews", review_routes(reviews, auth_service.clone()))
        .nest("/api/admin", admin_routes(verification, auth_service))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(security_headers_layer())
                .layer(cors_layer()),
        )
}

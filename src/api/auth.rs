use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::auth::{
    AuthError, AuthResponse, AuthService, ForgotPasswordRequest, LoginRequest, MessageResponse,
    RefreshTokenRequest, RegisterRequest, ResetPasswordRequest, TokenResponse,
};
use crate::services::{DecisionAction, VerificationError, VerificationService};

#[derive(Clone)]
pub struct AuthApiState {
    pub auth: AuthService,
    pub verification: VerificationService,
}

/// Authentication routes
pub fn auth_routes(auth_service: AuthService, verification: VerificationService) -> Router {
    let state = AuthApiState {
        auth: auth_service,
        verification,
    };

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh_token))
        .route("/logout", post(logout))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/:token", post(reset_password))
        .route("/verify-trainer/:token", get(verify_trainer))
        .with_state(state)
}

/// Register a new user (students and trainer applicants)
#[tracing::instrument(skip(state, request))]
async fn register(
    State(state): State<AuthApiState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let response = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Login user
#[tracing::instrument(skip(state, request))]
async fn login(
    State(state): State<AuthApiState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let response = state.auth.login(request).await?;
    Ok(Json(response))
}

/// Refresh access token
#[tracing::instrument(skip(state, request))]
async fn refresh_token(
    State(state): State<AuthApiState>,
    Json(request): Json<RefreshTokenRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let response = state.auth.refresh_token(request).await?;
    Ok(Json(response))
}

/// Logout user
#[tracing::instrument(skip(state, request))]
async fn logout(
    State(state): State<AuthApiState>,
    request: Request,
) -> Result<Json<MessageResponse>, AuthError> {
    let auth_header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or(AuthError::MissingAuthHeader)?;

    let token = crate::auth::extract_bearer_token(auth_header)?;
    let response = state.auth.logout(token).await?;
    Ok(Json(response))
}

/// Request a password reset link
#[tracing::instrument(skip(state, request))]
async fn forgot_password(
    State(state): State<AuthApiState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let response = state.auth.forgot_password(request).await?;
    Ok(Json(response))
}

/// Redeem a password reset token
#[tracing::instrument(skip(state, request))]
async fn reset_password(
    State(state): State<AuthApiState>,
    Path(token): Path<String>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let response = state
        .auth
        .reset_password(&token, &request.new_password)
        .await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
struct VerifyTrainerQuery {
    action: DecisionAction,
}

/// Redeem a trainer decision link. Renders a standalone confirmation page:
/// the token itself is the authorization, no app session involved.
#[tracing::instrument(skip(state, token))]
async fn verify_trainer(
    State(state): State<AuthApiState>,
    Path(token): Path<String>,
    Query(query): Query<VerifyTrainerQuery>,
) -> Response {
    match state.verification.resolve(&token, query.action).await {
        Ok(outcome) => {
            let (headline, detail) = match outcome.action {
                DecisionAction::Approve => (
                    "Application approved",
                    format!("{} is now a verified trainer.", outcome.trainer_name),
                ),
                DecisionAction::Reject => (
                    "Application rejected",
                    format!(
                        "The application from {} has been rejected.",
                        outcome.trainer_name
                    ),
                ),
            };
            Html(decision_page(headline, &detail)).into_response()
        }
        Err(e) => {
            let status = match e {
                VerificationError::InvalidOrExpiredToken
                | VerificationError::AlreadyResolved
                | VerificationError::AlreadyPending
                | VerificationError::AlreadyVerified => StatusCode::BAD_REQUEST,
                VerificationError::TrainerNotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let page = decision_page("Unable to process this link", &e.to_string());
            (status, Html(page)).into_response()
        }
    }
}

fn decision_page(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title} - TrainHub</title></head>
<body style="font-family: sans-serif; max-width: 32rem; margin: 4rem auto;">
<h1>{title}</h1>
<p>{body}</p>
</body>
</html>"#
    )
}

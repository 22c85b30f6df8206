use axum::{
    extract::{Path, State},
    middleware,
    response::Json,
    routing::put,
    Extension, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{admin_only_middleware, jwt_auth_middleware, AuthService, UserSession};
use crate::models::{TrainerProfile, VerificationStatus};
use crate::services::{VerificationError, VerificationService};

#[derive(Debug, Deserialize)]
pub struct VerificationOverrideRequest {
    pub status: VerificationStatus,
    /// Mandatory: every manual override is recorded with its reason.
    pub reason: String,
}

/// Admin endpoints
pub fn admin_routes(verification: VerificationService, auth_service: AuthService) -> Router {
    Router::new()
        .route(
            "/trainers/:id/verification",
            put(override_verification)
                .route_layer(middleware::from_fn(admin_only_middleware))
                .route_layer(middleware::from_fn_with_state(
                    auth_service,
                    jwt_auth_middleware,
                )),
        )
        .with_state(verification)
}

/// Manually set a trainer's verification status, with an audit trail entry.
#[tracing::instrument(skip(verification, request))]
async fn override_verification(
    State(verification): State<VerificationService>,
    Extension(session): Extension<UserSession>,
    Path(trainer_id): Path<Uuid>,
    Json(request): Json<VerificationOverrideRequest>,
) -> Result<Json<TrainerProfile>, VerificationError> {
    let profile = verification
        .admin_override(session.user_id, trainer_id, request.status, &request.reason)
        .await?;

    Ok(Json(profile))
}

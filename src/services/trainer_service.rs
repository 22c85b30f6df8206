use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::TrainerPublic;

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("Trainer not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for TrainerError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            TrainerError::NotFound => (StatusCode::NOT_FOUND, "Trainer not found"),
            TrainerError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Public trainer directory. Unverified profiles are never visible here.
#[derive(Clone)]
pub struct TrainerService {
    db: PgPool,
}

impl TrainerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_verified(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TrainerPublic>, TrainerError> {
        let trainers = sqlx::query_as::<_, TrainerPublic>(
            "SELECT u.id, u.full_name, p.bio, p.specialty, p.hourly_rate_cents,
                    p.rating_average, p.total_bookings
             FROM users u
             JOIN trainer_profiles p ON p.user_id = u.id
             WHERE p.verification_status = 'verified' AND p.available = TRUE
             ORDER BY p.rating_average DESC, p.total_bookings DESC
             LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        Ok(trainers)
    }

    /// Look up one verified trainer. Pending and rejected profiles look
    /// exactly like missing ones from the outside.
    pub async fn get_verified(&self, trainer_id: Uuid) -> Result<TrainerPublic, TrainerError> {
        sqlx::query_as::<_, TrainerPublic>(
            "SELECT u.id, u.full_name, p.bio, p.specialty, p.hourly_rate_cents,
                    p.rating_average, p.total_bookings
             FROM users u
             JOIN trainer_profiles p ON p.user_id = u.id
             WHERE u.id = $1 AND p.verification_status = 'verified'",
        )
        .bind(trainer_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(TrainerError::NotFound)
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Booking, CreateBooking, PaymentStatus, TrainerProfile, VerificationStatus};
use crate::services::payment_gateway_service::WebhookEvent;

const BOOKING_COLUMNS: &str = "id, trainer_id, student_id, student_name, amount_cents, currency, \
     payment_method, payment_id, payment_status, session_id, created_at, updated_at";

const PROFILE_COLUMNS: &str = "user_id, bio, specialty, hourly_rate_cents, available, \
     verification_status, rejection_date, rating_average, total_bookings, created_at, updated_at";

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Trainer is not available for booking")]
    TrainerUnavailable,
    #[error("Amount must be a positive number of minor currency units")]
    InvalidAmount,
    #[error("Bookings cannot transition back to pending")]
    InvalidTargetStatus,
    #[error("Booking not found")]
    NotFound,
    #[error("Not your booking")]
    NotYourBooking,
    #[error("Payment state conflict: booking is already {current}")]
    PaymentConflict { current: &'static str },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            BookingError::TrainerUnavailable => (StatusCode::BAD_REQUEST, "Trainer unavailable"),
            BookingError::InvalidAmount => (StatusCode::BAD_REQUEST, "Invalid amount"),
            BookingError::InvalidTargetStatus => (StatusCode::BAD_REQUEST, "Invalid status"),
            BookingError::NotFound => (StatusCode::NOT_FOUND, "Booking not found"),
            BookingError::NotYourBooking => (StatusCode::FORBIDDEN, "Not your booking"),
            BookingError::PaymentConflict { .. } => (StatusCode::CONFLICT, "Payment conflict"),
            BookingError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Owns booking records and every `payment_status` transition. The two
/// writers that can race here (client confirmation and webhook delivery)
/// both converge through [`BookingService::mark_payment_status`].
#[derive(Clone)]
pub struct BookingService {
    db: PgPool,
}

impl BookingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a pending booking against a verified, available trainer.
    pub async fn create_booking(
        &self,
        student_id: Uuid,
        request: &CreateBooking,
    ) -> Result<Booking, BookingError> {
        if request.amount_cents <= 0 {
            return Err(BookingError::InvalidAmount);
        }

        let profile = sqlx::query_as::<_, TrainerProfile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM trainer_profiles WHERE user_id = $1"
        ))
        .bind(request.trainer_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(BookingError::TrainerUnavailable)?;

        if profile.status() != VerificationStatus::Verified || !profile.available {
            return Err(BookingError::TrainerUnavailable);
        }

        let student_name: String = sqlx::query_scalar("SELECT full_name FROM users WHERE id = $1")
            .bind(student_id)
            .fetch_one(&self.db)
            .await?;

        let now = Utc::now();
        let booking = sqlx::query_as::<_, Booking>(&format!(
            "INSERT INTO bookings
                 (id, trainer_id, student_id, student_name, amount_cents, currency,
                  payment_method, payment_id, payment_status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', $9, $9)
             RETURNING {BOOKING_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.trainer_id)
        .bind(student_id)
        .bind(&student_name)
        .bind(request.amount_cents)
        .bind(request.currency.as_deref().unwrap_or("usd").to_lowercase())
        .bind(request.payment_method.as_str())
        .bind(&request.payment_id)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        tracing::info!(booking_id = %booking.id, trainer_id = %booking.trainer_id, "created booking");

        Ok(booking)
    }

    /// Apply a payment outcome to a booking. Idempotent: re-applying the same
    /// terminal outcome with the same payment id is a no-op success, so the
    /// webhook and the client confirmation call can arrive in either order,
    /// or both. Anything else against a terminal booking is a conflict.
    ///
    /// `caller`, when set, must be the booking's student.
    pub async fn mark_payment_status(
        &self,
        booking_id: Uuid,
        target: PaymentStatus,
        payment_id: Option<&str>,
        caller: Option<Uuid>,
    ) -> Result<Booking, BookingError> {
        if target == PaymentStatus::Pending {
            return Err(BookingError::InvalidTargetStatus);
        }

        let mut tx = self.db.begin().await?;

        let booking = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE"
        ))
        .bind(booking_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(BookingError::NotFound)?;

        if let Some(caller) = caller {
            if booking.student_id != caller {
                return Err(BookingError::NotYourBooking);
            }
        }

        let current = booking.status();

        if current == PaymentStatus::Pending {
            let now = Utc::now();
            let updated = sqlx::query_as::<_, Booking>(&format!(
                "UPDATE bookings
                 SET payment_status = $2, payment_id = COALESCE($3, payment_id), updated_at = $4
                 WHERE id = $1
                 RETURNING {BOOKING_COLUMNS}"
            ))
            .bind(booking_id)
            .bind(target.as_str())
            .bind(payment_id)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            if target == PaymentStatus::Completed {
                sqlx::query(
                    "UPDATE trainer_profiles
                     SET total_bookings = total_bookings + 1, updated_at = $2
                     WHERE user_id = $1",
                )
                .bind(booking.trainer_id)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;

            tracing::info!(
                booking_id = %booking_id,
                status = target.as_str(),
                "booking payment status updated"
            );

            return Ok(updated);
        }

        // Already terminal. The same outcome for the same payment is a
        // duplicate delivery, not a conflict.
        if current == target && (payment_id.is_none() || booking.payment_id.as_deref() == payment_id)
        {
            tracing::debug!(booking_id = %booking_id, "duplicate payment status update ignored");
            return Ok(booking);
        }

        Err(BookingError::PaymentConflict {
            current: current.as_str(),
        })
    }

    /// Align internal payment state with an asynchronous provider event.
    /// Missing bookings are expected (the webhook can outrun booking
    /// creation) and are logged, never errors.
    pub async fn reconcile_from_webhook(&self, event: &WebhookEvent) -> Result<(), BookingError> {
        let WebhookEvent::PaymentSucceeded { intent_id } = event else {
            return Ok(());
        };

        let mut tx = self.db.begin().await?;

        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings
             WHERE payment_id = $1 AND payment_status = 'pending'
             FOR UPDATE"
        ))
        .bind(intent_id)
        .fetch_all(&mut *tx)
        .await?;

        if bookings.is_empty() {
            tracing::info!(
                %intent_id,
                "no pending bookings matched webhook; nothing to reconcile"
            );
            return Ok(());
        }

        let now = Utc::now();
        for booking in &bookings {
            sqlx::query(
                "UPDATE bookings SET payment_status = 'completed', updated_at = $2 WHERE id = $1",
            )
            .bind(booking.id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE trainer_profiles
                 SET total_bookings = total_bookings + 1, updated_at = $2
                 WHERE user_id = $1",
            )
            .bind(booking.trainer_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(%intent_id, count = bookings.len(), "reconciled bookings from webhook");

        Ok(())
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<Booking, BookingError> {
        sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1"
        ))
        .bind(booking_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(BookingError::NotFound)
    }

    pub async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE student_id = $1 ORDER BY created_at DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.db)
        .await?;

        Ok(bookings)
    }

    pub async fn list_for_trainer(&self, trainer_id: Uuid) -> Result<Vec<Booking>, BookingError> {
        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE trainer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(trainer_id)
        .fetch_all(&self.db)
        .await?;

        Ok(bookings)
    }
}

use std::collections::BTreeSet;

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

use crate::models::{
    Booking, CreateSession, PaymentStatus, Session, SessionStatus, SessionWithStudents,
};

const SESSION_COLUMNS: &str = "id, title, trainer_id, scheduled_date, duration_minutes, status, \
     meeting_link, created_at, updated_at";

const BOOKING_COLUMNS: &str = "id, trainer_id, student_id, student_name, amount_cents, currency, \
     payment_method, payment_id, payment_status, session_id, created_at, updated_at";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),
    #[error("Booking {0} not found")]
    BookingNotFound(Uuid),
    #[error("Booking {0} has not been paid")]
    BookingNotPaid(Uuid),
    #[error("Booking {0} is already scheduled into a session")]
    BookingAlreadyScheduled(Uuid),
    #[error("Booking {0} belongs to another trainer")]
    ForeignBooking(Uuid),
    #[error("Illegal session transition: {from} -> {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("Session not found")]
    NotFound,
    #[error("Not your session")]
    NotYourSession,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            SessionError::Validation(_) => (StatusCode::BAD_REQUEST, "Validation failed"),
            SessionError::BookingNotFound(_) => (StatusCode::NOT_FOUND, "Booking not found"),
            SessionError::BookingNotPaid(_) => (StatusCode::BAD_REQUEST, "Booking not paid"),
            SessionError::BookingAlreadyScheduled(_) => {
                (StatusCode::CONFLICT, "Booking already scheduled")
            }
            SessionError::ForeignBooking(_) => (StatusCode::FORBIDDEN, "Not your booking"),
            SessionError::IllegalTransition { .. } => (StatusCode::CONFLICT, "Illegal transition"),
            SessionError::NotFound => (StatusCode::NOT_FOUND, "Session not found"),
            SessionError::NotYourSession => (StatusCode::FORBIDDEN, "Not your session"),
            SessionError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Groups paid bookings into scheduled lesson instances and owns the
/// session lifecycle.
#[derive(Clone)]
pub struct SessionService {
    db: PgPool,
}

impl SessionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a session from a set of completed bookings. All-or-nothing:
    /// the session row, the participant set, and the booking back-references
    /// land in one transaction or not at all.
    pub async fn create_session(
        &self,
        trainer_id: Uuid,
        request: &CreateSession,
    ) -> Result<SessionWithStudents, SessionError> {
        if request.title.trim().is_empty() {
            return Err(SessionError::Validation("title must not be empty".into()));
        }
        if request.booking_ids.is_empty() {
            return Err(SessionError::Validation(
                "at least one booking is required".into(),
            ));
        }
        if request.duration_minutes <= 0 {
            return Err(SessionError::Validation(
                "duration_minutes must be positive".into(),
            ));
        }

        let booking_ids: Vec<Uuid> = request
            .booking_ids
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut tx = self.db.begin().await?;

        let bookings = sqlx::query_as::<_, Booking>(&format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ANY($1) FOR UPDATE"
        ))
        .bind(&booking_ids)
        .fetch_all(&mut *tx)
        .await?;

        let found: BTreeSet<Uuid> = bookings.iter().map(|b| b.id).collect();
        for id in &booking_ids {
            if !found.contains(id) {
                return Err(SessionError::BookingNotFound(*id));
            }
        }

        for booking in &bookings {
            if booking.trainer_id != trainer_id {
                return Err(SessionError::ForeignBooking(booking.id));
            }
            if booking.session_id.is_some() {
                return Err(SessionError::BookingAlreadyScheduled(booking.id));
            }
            if booking.status() != PaymentStatus::Completed {
                return Err(SessionError::BookingNotPaid(booking.id));
            }
        }

        let now = Utc::now();
        let meeting_link = format!("https://meet.trainhub.app/room/{}", Uuid::new_v4());

        let session = sqlx::query_as::<_, Session>(&format!(
            "INSERT INTO sessions
                 (id, title, trainer_id, scheduled_date, duration_minutes, status,
                  meeting_link, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, 'scheduled', $6, $7, $7)
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(request.title.trim())
        .bind(trainer_id)
        .bind(request.scheduled_date)
        .bind(request.duration_minutes)
        .bind(&meeting_link)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        // Participant set is derived from the bookings once, at creation.
        let student_ids: BTreeSet<Uuid> = bookings.iter().map(|b| b.student_id).collect();
        for student_id in &student_ids {
            sqlx::query(
                "INSERT INTO session_participants (session_id, student_id) VALUES ($1, $2)",
            )
            .bind(session.id)
            .bind(student_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE bookings SET session_id = $1, updated_at = $2 WHERE id = ANY($3)")
            .bind(session.id)
            .bind(now)
            .bind(&booking_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(
            session_id = %session.id,
            trainer_id = %trainer_id,
            bookings = booking_ids.len(),
            "created session"
        );

        Ok(SessionWithStudents {
            session,
            student_ids: student_ids.into_iter().collect(),
        })
    }

    /// Advance the session lifecycle. Only scheduled -> active and
    /// active -> completed are legal; everything else leaves state unchanged.
    pub async fn transition(
        &self,
        session_id: Uuid,
        target: SessionStatus,
        trainer_id: Uuid,
    ) -> Result<Session, SessionError> {
        let mut tx = self.db.begin().await?;

        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 FOR UPDATE"
        ))
        .bind(session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(SessionError::NotFound)?;

        if session.trainer_id != trainer_id {
            return Err(SessionError::NotYourSession);
        }

        let from = session.status();
        if !from.can_transition_to(target) {
            return Err(SessionError::IllegalTransition {
                from: from.as_str(),
                to: target.as_str(),
            });
        }

        let updated = sqlx::query_as::<_, Session>(&format!(
            "UPDATE sessions SET status = $2, updated_at = $3 WHERE id = $1
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(session_id)
        .bind(target.as_str())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            session_id = %session_id,
            from = from.as_str(),
            to = target.as_str(),
            "session transitioned"
        );

        Ok(updated)
    }

    pub async fn get_with_students(
        &self,
        session_id: Uuid,
    ) -> Result<SessionWithStudents, SessionError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(SessionError::NotFound)?;

        let student_ids = self.student_ids(session_id).await?;

        Ok(SessionWithStudents {
            session,
            student_ids,
        })
    }

    pub async fn student_ids(&self, session_id: Uuid) -> Result<Vec<Uuid>, SessionError> {
        let ids = sqlx::query_scalar(
            "SELECT student_id FROM session_participants WHERE session_id = $1 ORDER BY student_id",
        )
        .bind(session_id)
        .fetch_all(&self.db)
        .await?;

        Ok(ids)
    }

    pub async fn list_for_trainer(&self, trainer_id: Uuid) -> Result<Vec<Session>, SessionError> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE trainer_id = $1
             ORDER BY scheduled_date DESC"
        ))
        .bind(trainer_id)
        .fetch_all(&self.db)
        .await?;

        Ok(sessions)
    }

    pub async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<Session>, SessionError> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions s
             JOIN session_participants sp ON sp.session_id = s.id
             WHERE sp.student_id = $1
             ORDER BY s.scheduled_date DESC"
        ))
        .bind(student_id)
        .fetch_all(&self.db)
        .await?;

        Ok(sessions)
    }
}

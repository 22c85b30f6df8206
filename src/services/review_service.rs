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

use crate::models::{CreateReview, Review, Session, SessionStatus, UpdateReview};

const REVIEW_COLUMNS: &str =
    "id, student_id, trainer_id, session_id, booking_id, rating, comment, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, title, trainer_id, scheduled_date, duration_minutes, status, \
     meeting_link, created_at, updated_at";

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Rating must be an integer between 1 and 5")]
    InvalidRating,
    #[error("Session is not completed")]
    SessionNotCompleted,
    #[error("Only session participants may leave a review")]
    NotAParticipant,
    #[error("A review for this session already exists")]
    DuplicateReview,
    #[error("Session not found")]
    SessionNotFound,
    #[error("Review not found")]
    NotFound,
    #[error("Only the author may modify a review")]
    NotYourReview,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ReviewError::InvalidRating => (StatusCode::BAD_REQUEST, "Invalid rating"),
            ReviewError::SessionNotCompleted => (StatusCode::BAD_REQUEST, "Session not completed"),
            ReviewError::NotAParticipant => (StatusCode::FORBIDDEN, "Not a participant"),
            ReviewError::DuplicateReview => (StatusCode::CONFLICT, "Duplicate review"),
            ReviewError::SessionNotFound => (StatusCode::NOT_FOUND, "Session not found"),
            ReviewError::NotFound => (StatusCode::NOT_FOUND, "Review not found"),
            ReviewError::NotYourReview => (StatusCode::FORBIDDEN, "Not your review"),
            ReviewError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Mean of all ratings rounded to one decimal place; 5.0 for an empty set.
pub fn aggregate_rating(ratings: &[i32]) -> f64 {
    if ratings.is_empty() {
        return 5.0;
    }

    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    let mean = sum as f64 / ratings.len() as f64;
    (mean * 10.0).round() / 10.0
}

/// Owns review rows and the derived `rating_average` on trainer profiles.
/// No other component writes the aggregate.
#[derive(Clone)]
pub struct ReviewService {
    db: PgPool,
}

impl ReviewService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// One review per (student, completed session). Recomputes the trainer
    /// aggregate in the same transaction.
    pub async fn submit_review(
        &self,
        student_id: Uuid,
        request: &CreateReview,
    ) -> Result<Review, ReviewError> {
        if !(1..=5).contains(&request.rating) {
            return Err(ReviewError::InvalidRating);
        }

        let mut tx = self.db.begin().await?;

        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(request.session_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ReviewError::SessionNotFound)?;

        if session.status() != SessionStatus::Completed {
            return Err(ReviewError::SessionNotCompleted);
        }

        let participant: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM session_participants WHERE session_id = $1 AND student_id = $2",
        )
        .bind(request.session_id)
        .bind(student_id)
        .fetch_optional(&mut *tx)
        .await?;

        if participant.is_none() {
            return Err(ReviewError::NotAParticipant);
        }

        let existing: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM reviews WHERE student_id = $1 AND session_id = $2",
        )
        .bind(student_id)
        .bind(request.session_id)
        .fetch_optional(&mut *tx)
        .await?;

        if existing.is_some() {
            return Err(ReviewError::DuplicateReview);
        }

        let now = Utc::now();
        let review = sqlx::query_as::<_, Review>(&format!(
            "INSERT INTO reviews
                 (id, student_id, trainer_id, session_id, booking_id, rating, comment,
                  created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(student_id)
        .bind(session.trainer_id)
        .bind(request.session_id)
        .bind(request.booking_id)
        .bind(request.rating)
        .bind(&request.comment)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_duplicate)?;

        recompute_rating(&mut tx, session.trainer_id).await?;

        tx.commit().await?;

        tracing::info!(review_id = %review.id, trainer_id = %session.trainer_id, "review submitted");

        Ok(review)
    }

    /// Author-only edit; re-runs the aggregate recompute.
    pub async fn update_review(
        &self,
        student_id: Uuid,
        review_id: Uuid,
        request: &UpdateReview,
    ) -> Result<Review, ReviewError> {
        if let Some(rating) = request.rating {
            if !(1..=5).contains(&rating) {
                return Err(ReviewError::InvalidRating);
            }
        }

        let mut tx = self.db.begin().await?;

        let review = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1 FOR UPDATE"
        ))
        .bind(review_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ReviewError::NotFound)?;

        if review.student_id != student_id {
            return Err(ReviewError::NotYourReview);
        }

        let updated = sqlx::query_as::<_, Review>(&format!(
            "UPDATE reviews
             SET rating = COALESCE($2, rating),
                 comment = COALESCE($3, comment),
                 updated_at = $4
             WHERE id = $1
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(review_id)
        .bind(request.rating)
        .bind(&request.comment)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        recompute_rating(&mut tx, review.trainer_id).await?;

        tx.commit().await?;

        Ok(updated)
    }

    /// Author-only delete; the aggregate falls back to 5.0 when the last
    /// review goes away.
    pub async fn delete_review(&self, student_id: Uuid, review_id: Uuid) -> Result<(), ReviewError> {
        let mut tx = self.db.begin().await?;

        let review = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1 FOR UPDATE"
        ))
        .bind(review_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ReviewError::NotFound)?;

        if review.student_id != student_id {
            return Err(ReviewError::NotYourReview);
        }

        sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(review_id)
            .execute(&mut *tx)
            .await?;

        recompute_rating(&mut tx, review.trainer_id).await?;

        tx.commit().await?;

        tracing::info!(review_id = %review_id, "review deleted");

        Ok(())
    }

    pub async fn list_for_trainer(&self, trainer_id: Uuid) -> Result<Vec<Review>, ReviewError> {
        let reviews = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE trainer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(trainer_id)
        .fetch_all(&self.db)
        .await?;

        Ok(reviews)
    }
}

/// Read-all-then-average under a row lock on the trainer profile, so
/// concurrent recomputes for one trainer serialize instead of interleaving.
async fn recompute_rating(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    trainer_id: Uuid,
) -> Result<(), sqlx::Error> {
    let locked: Option<Uuid> =
        sqlx::query_scalar("SELECT user_id FROM trainer_profiles WHERE user_id = $1 FOR UPDATE")
            .bind(trainer_id)
            .fetch_optional(&mut **tx)
            .await?;

    if locked.is_none() {
        tracing::warn!(%trainer_id, "no trainer profile to recompute rating for");
        return Ok(());
    }

    let ratings: Vec<i32> = sqlx::query_scalar("SELECT rating FROM reviews WHERE trainer_id = $1")
        .bind(trainer_id)
        .fetch_all(&mut **tx)
        .await?;

    let average = aggregate_rating(&ratings);

    sqlx::query(
        "UPDATE trainer_profiles SET rating_average = $2, updated_at = $3 WHERE user_id = $1",
    )
    .bind(trainer_id)
    .bind(average)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// The UNIQUE (student_id, session_id) constraint backs the duplicate
/// pre-check against racing submissions.
fn map_duplicate(err: sqlx::Error) -> ReviewError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.constraint() == Some("reviews_student_session_unique") {
            return ReviewError::DuplicateReview;
        }
    }
    ReviewError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_rating_defaults_to_five_when_empty() {
        assert_eq!(aggregate_rating(&[]), 5.0);
    }

    #[test]
    fn test_aggregate_rating_rounds_to_one_decimal() {
        assert_eq!(aggregate_rating(&[5]), 5.0);
        assert_eq!(aggregate_rating(&[4, 5]), 4.5);
        assert_eq!(aggregate_rating(&[3, 4, 4]), 3.7); // 11/3 = 3.666...
        assert_eq!(aggregate_rating(&[2, 3, 3]), 2.7); // 8/3 = 2.666...
        assert_eq!(aggregate_rating(&[1, 2]), 1.5);
    }

    #[test]
    fn test_aggregate_rating_stays_in_range() {
        assert_eq!(aggregate_rating(&[1, 1, 1]), 1.0);
        assert_eq!(aggregate_rating(&[5, 5, 5, 5]), 5.0);
    }
}

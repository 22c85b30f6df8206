mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use sqlx::PgPool;
use uuid::Uuid;

use trainhub::models::{
    CreateBooking, CreateReview, CreateSession, PaymentMethod, PaymentStatus, SessionStatus,
    UpdateReview, VerificationStatus,
};
use trainhub::services::{BookingService, ReviewError, ReviewService, SessionService};

struct Fixture {
    trainer: Uuid,
    students: Vec<Uuid>,
    session_id: Uuid,
}

/// Verified trainer, one paid booking per student, a session bound over all
/// of them, advanced to `completed` unless told otherwise.
async fn fixture(pool: &PgPool, student_count: usize, complete: bool) -> Fixture {
    let bookings = BookingService::new(pool.clone());
    let sessions = SessionService::new(pool.clone());
    let trainer = common::create_trainer(pool, VerificationStatus::Verified).await;

    let mut students = Vec::new();
    let mut booking_ids = Vec::new();
    for _ in 0..student_count {
        let student = common::create_student(pool).await;
        let booking = bookings
            .create_booking(
                student,
                &CreateBooking {
                    trainer_id: trainer,
                    amount_cents: 2500,
                    currency: None,
                    payment_method: PaymentMethod::Gateway,
                    payment_id: None,
                },
            )
            .await
            .unwrap();
        bookings
            .mark_payment_status(
                booking.id,
                PaymentStatus::Completed,
                Some(&format!("pi_{}", Uuid::new_v4().simple())),
                None,
            )
            .await
            .unwrap();
        students.push(student);
        booking_ids.push(booking.id);
    }

    let created = sessions
        .create_session(
            trainer,
            &CreateSession {
                title: "Group lesson".to_string(),
                booking_ids,
                scheduled_date: Utc::now() + Duration::days(1),
                duration_minutes: 45,
            },
        )
        .await
        .unwrap();

    if complete {
        sessions
            .transition(created.session.id, SessionStatus::Active, trainer)
            .await
            .unwrap();
        sessions
            .transition(created.session.id, SessionStatus::Completed, trainer)
            .await
            .unwrap();
    }

    Fixture {
        trainer,
        students,
        session_id: created.session.id,
    }
}

fn review(session_id: Uuid, rating: i32) -> CreateReview {
    CreateReview {
        session_id,
        booking_id: None,
        rating,
        comment: Some("Great lesson".to_string()),
    }
}

#[tokio::test]
async fn test_review_requires_completed_session_and_participation() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let reviews = ReviewService::new(pool.clone());

    // Session still scheduled: no reviews yet.
    let open = fixture(&pool, 1, false).await;
    assert_matches!(
        reviews
            .submit_review(open.students[0], &review(open.session_id, 5))
            .await,
        Err(ReviewError::SessionNotCompleted)
    );

    let done = fixture(&pool, 1, true).await;

    // Out-of-range ratings are refused, never clamped.
    for bad_rating in [0, 6, -1] {
        assert_matches!(
            reviews
                .submit_review(done.students[0], &review(done.session_id, bad_rating))
                .await,
            Err(ReviewError::InvalidRating)
        );
    }

    // A student who was not part of the session cannot review it.
    let outsider = common::create_student(&pool).await;
    assert_matches!(
        reviews
            .submit_review(outsider, &review(done.session_id, 5))
            .await,
        Err(ReviewError::NotAParticipant)
    );

    // No rows were created by any of the failed attempts.
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE session_id = $1")
        .bind(done.session_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    // The participant can review, exactly once.
    reviews
        .submit_review(done.students[0], &review(done.session_id, 5))
        .await
        .unwrap();
    assert_matches!(
        reviews
            .submit_review(done.students[0], &review(done.session_id, 4))
            .await,
        Err(ReviewError::DuplicateReview)
    );
}

#[tokio::test]
async fn test_aggregate_tracks_create_update_delete() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let reviews = ReviewService::new(pool.clone());
    let fx = fixture(&pool, 2, true).await;

    // No reviews yet: default aggregate.
    assert_eq!(common::trainer_rating(&pool, fx.trainer).await, 5.0);

    let first = reviews
        .submit_review(fx.students[0], &review(fx.session_id, 5))
        .await
        .unwrap();
    assert_eq!(common::trainer_rating(&pool, fx.trainer).await, 5.0);

    reviews
        .submit_review(fx.students[1], &review(fx.session_id, 4))
        .await
        .unwrap();
    assert_eq!(common::trainer_rating(&pool, fx.trainer).await, 4.5);

    // Editing replaces the old value; nothing is double counted.
    reviews
        .update_review(
            fx.students[0],
            first.id,
            &UpdateReview {
                rating: Some(3),
                comment: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(common::trainer_rating(&pool, fx.trainer).await, 3.5);

    // Only the author can touch a review.
    assert_matches!(
        reviews
            .update_review(
                fx.students[1],
                first.id,
                &UpdateReview {
                    rating: Some(1),
                    comment: None
                }
            )
            .await,
        Err(ReviewError::NotYourReview)
    );
    assert_matches!(
        reviews.delete_review(fx.students[1], first.id).await,
        Err(ReviewError::NotYourReview)
    );

    reviews.delete_review(fx.students[0], first.id).await.unwrap();
    assert_eq!(common::trainer_rating(&pool, fx.trainer).await, 4.0);

    // Deleting the last review resets the aggregate to 5.0.
    let remaining: Uuid =
        sqlx::query_scalar("SELECT id FROM reviews WHERE trainer_id = $1")
            .bind(fx.trainer)
            .fetch_one(&pool)
            .await
            .unwrap();
    reviews
        .delete_review(fx.students[1], remaining)
        .await
        .unwrap();
    assert_eq!(common::trainer_rating(&pool, fx.trainer).await, 5.0);
}

#[tokio::test]
async fn test_aggregate_rounds_to_one_decimal() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let reviews = ReviewService::new(pool.clone());
    let fx = fixture(&pool, 3, true).await;

    for (student, rating) in fx.students.iter().zip([3, 4, 4]) {
        reviews
            .submit_review(*student, &review(fx.session_id, rating))
            .await
            .unwrap();
    }

    // 11 / 3 = 3.666... -> 3.7
    assert_eq!(common::trainer_rating(&pool, fx.trainer).await, 3.7);
}

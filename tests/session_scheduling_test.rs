mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use uuid::Uuid;

use trainhub::models::{CreateBooking, CreateSession, PaymentMethod, PaymentStatus, SessionStatus, VerificationStatus};
use trainhub::services::{BookingService, SessionError, SessionService};

async fn paid_booking(pool: &sqlx::PgPool, trainer: Uuid, student: Uuid) -> Uuid {
    let bookings = BookingService::new(pool.clone());
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

    booking.id
}

async fn pending_booking(pool: &sqlx::PgPool, trainer: Uuid, student: Uuid) -> Uuid {
    BookingService::new(pool.clone())
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
        .unwrap()
        .id
}

fn session_request(booking_ids: Vec<Uuid>) -> CreateSession {
    CreateSession {
        title: "Conversational practice".to_string(),
        booking_ids,
        scheduled_date: Utc::now() + Duration::days(2),
        duration_minutes: 60,
    }
}

#[tokio::test]
async fn test_session_binds_paid_bookings_and_derives_students() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let sessions = SessionService::new(pool.clone());
    let trainer = common::create_trainer(&pool, VerificationStatus::Verified).await;
    let student_a = common::create_student(&pool).await;
    let student_b = common::create_student(&pool).await;

    let booking_a = paid_booking(&pool, trainer, student_a).await;
    let booking_b = paid_booking(&pool, trainer, student_b).await;

    let created = sessions
        .create_session(trainer, &session_request(vec![booking_a, booking_b]))
        .await
        .unwrap();

    assert_eq!(created.session.status(), SessionStatus::Scheduled);
    assert!(created.session.meeting_link.contains("/room/"));
    let mut expected = vec![student_a, student_b];
    expected.sort();
    assert_eq!(created.student_ids, expected);

    // Both bookings now point at the session.
    for booking_id in [booking_a, booking_b] {
        let session_id: Option<Uuid> =
            sqlx::query_scalar("SELECT session_id FROM bookings WHERE id = $1")
                .bind(booking_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(session_id, Some(created.session.id));
    }

    // A booking can be attached to at most one session.
    assert_matches!(
        sessions
            .create_session(trainer, &session_request(vec![booking_a]))
            .await,
        Err(SessionError::BookingAlreadyScheduled(id)) if id == booking_a
    );
}

#[tokio::test]
async fn test_session_creation_is_all_or_nothing() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let sessions = SessionService::new(pool.clone());
    let trainer = common::create_trainer(&pool, VerificationStatus::Verified).await;
    let student = common::create_student(&pool).await;

    let paid = paid_booking(&pool, trainer, student).await;
    let unpaid = pending_booking(&pool, trainer, student).await;

    assert_matches!(
        sessions
            .create_session(trainer, &session_request(vec![paid, unpaid]))
            .await,
        Err(SessionError::BookingNotPaid(id)) if id == unpaid
    );

    // No partial binding was left behind on the paid booking.
    let session_id: Option<Uuid> =
        sqlx::query_scalar("SELECT session_id FROM bookings WHERE id = $1")
            .bind(paid)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(session_id, None);

    // Unknown bookings abort the whole set too.
    assert_matches!(
        sessions
            .create_session(trainer, &session_request(vec![paid, Uuid::new_v4()]))
            .await,
        Err(SessionError::BookingNotFound(_))
    );
}

#[tokio::test]
async fn test_foreign_bookings_are_rejected() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let sessions = SessionService::new(pool.clone());
    let trainer = common::create_trainer(&pool, VerificationStatus::Verified).await;
    let other_trainer = common::create_trainer(&pool, VerificationStatus::Verified).await;
    let student = common::create_student(&pool).await;

    let booking = paid_booking(&pool, other_trainer, student).await;

    assert_matches!(
        sessions
            .create_session(trainer, &session_request(vec![booking]))
            .await,
        Err(SessionError::ForeignBooking(id)) if id == booking
    );
}

#[tokio::test]
async fn test_lifecycle_allows_only_forward_transitions() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let sessions = SessionService::new(pool.clone());
    let trainer = common::create_trainer(&pool, VerificationStatus::Verified).await;
    let student = common::create_student(&pool).await;

    let booking = paid_booking(&pool, trainer, student).await;
    let created = sessions
        .create_session(trainer, &session_request(vec![booking]))
        .await
        .unwrap();
    let session_id = created.session.id;

    // Skipping straight to completed is illegal and leaves state unchanged.
    assert_matches!(
        sessions
            .transition(session_id, SessionStatus::Completed, trainer)
            .await,
        Err(SessionError::IllegalTransition { .. })
    );
    let unchanged = sessions.get_with_students(session_id).await.unwrap();
    assert_eq!(unchanged.session.status(), SessionStatus::Scheduled);

    // Another trainer cannot drive the lifecycle.
    let other_trainer = common::create_trainer(&pool, VerificationStatus::Verified).await;
    assert_matches!(
        sessions
            .transition(session_id, SessionStatus::Active, other_trainer)
            .await,
        Err(SessionError::NotYourSession)
    );

    let active = sessions
        .transition(session_id, SessionStatus::Active, trainer)
        .await
        .unwrap();
    assert_eq!(active.status(), SessionStatus::Active);

    assert_matches!(
        sessions
            .transition(session_id, SessionStatus::Scheduled, trainer)
            .await,
        Err(SessionError::IllegalTransition { .. })
    );

    let completed = sessions
        .transition(session_id, SessionStatus::Completed, trainer)
        .await
        .unwrap();
    assert_eq!(completed.status(), SessionStatus::Completed);

    // Completed is terminal.
    for target in [
        SessionStatus::Scheduled,
        SessionStatus::Active,
        SessionStatus::Completed,
    ] {
        assert_matches!(
            sessions.transition(session_id, target, trainer).await,
            Err(SessionError::IllegalTransition { .. })
        );
    }
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use uuid::Uuid;

use crate::auth::{jwt_auth_middleware, student_only_middleware, AuthService, UserRole, UserSession};
use crate::models::{Booking, CreateBooking, UpdateBookingPayment};
use crate::services::{BookingError, BookingService, PaymentGatewayService};

#[derive(Clone)]
pub struct BookingsApiState {
    pub bookings: BookingService,
    pub gateway: PaymentGatewayService,
}

/// Booking routes. Creation is student-only; payment updates and reads are
/// open to any authenticated owner.
pub fn booking_routes(
    bookings: BookingService,
    gateway: PaymentGatewayService,
    auth_service: AuthService,
) -> Router {
    let state = BookingsApiState { bookings, gateway };

    Router::new()
        .route(
            "/",
            post(create_booking)
                .route_layer(middleware::from_fn(student_only_middleware))
                .get(list_bookings),
        )
        .route("/:id", get(get_booking))
        .route("/:id/payment", put(update_booking_payment))
        .layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(state)
}

/// Create a booking with `payment_status = pending`. Demo bookings complete
/// immediately against a synthetic payment.
#[tracing::instrument(skip(state, request))]
async fn create_booking(
    State(state): State<BookingsApiState>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<CreateBooking>,
) -> Result<(StatusCode, Json<Booking>), BookingError> {
    let booking = state
        .bookings
        .create_booking(session.user_id, &request)
        .await?;

    #[cfg(feature = "demo-payments")]
    if request.payment_method == crate::models::PaymentMethod::Demo {
        let demo = state
            .gateway
            .create_demo_payment(request.amount_cents)
            .map_err(|_| BookingError::InvalidAmount)?;

        let booking = state
            .bookings
            .mark_payment_status(
                booking.id,
                crate::models::PaymentStatus::Completed,
                Some(&demo.payment_id),
                None,
            )
            .await?;

        return Ok((StatusCode::CREATED, Json(booking)));
    }

    Ok((StatusCode::CREATED, Json(booking)))
}

/// List the caller's bookings (student or trainer view).
#[tracing::instrument(skip(state))]
async fn list_bookings(
    State(state): State<BookingsApiState>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<Vec<Booking>>, BookingError> {
    let bookings = match session.role {
        UserRole::Trainer => state.bookings.list_for_trainer(session.user_id).await?,
        _ => state.bookings.list_for_student(session.user_id).await?,
    };

    Ok(Json(bookings))
}

#[tracing::instrument(skip(state))]
async fn get_booking(
    State(state): State<BookingsApiState>,
    Extension(session): Extension<UserSession>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Booking>, BookingError> {
    let booking = state.bookings.get_booking(booking_id).await?;

    let allowed = session.role == UserRole::Admin
        || booking.student_id == session.user_id
        || booking.trainer_id == session.user_id;
    if !allowed {
        return Err(BookingError::NotYourBooking);
    }

    Ok(Json(booking))
}

/// Client-confirmation path for payment outcomes. Converges with the
/// webhook path inside the ledger.
#[tracing::instrument(skip(state, request))]
async fn update_booking_payment(
    State(state): State<BookingsApiState>,
    Extension(session): Extension<UserSession>,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<UpdateBookingPayment>,
) -> Result<Json<Booking>, BookingError> {
    // Admins may reconcile on behalf of a student.
    let caller = match session.role {
        UserRole::Admin => None,
        _ => Some(session.user_id),
    };

    let booking = state
        .bookings
        .mark_payment_status(
            booking_id,
            request.status,
            request.payment_id.as_deref(),
            caller,
        )
        .await?;

    Ok(Json(booking))
}

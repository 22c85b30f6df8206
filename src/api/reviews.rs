use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use uuid::Uuid;

use crate::auth::{jwt_auth_middleware, student_only_middleware, AuthService, UserSession};
use crate::models::{CreateReview, Review, UpdateReview};
use crate::services::{ReviewError, ReviewService};

/// Review routes. Mutations are student-only and author-bound; the
/// per-trainer listing is public.
pub fn review_routes(reviews: ReviewService, auth_service: AuthService) -> Router {
    let auth_layer = middleware::from_fn_with_state(auth_service, jwt_auth_middleware);

    Router::new()
        .route(
            "/",
            post(create_review)
                .route_layer(middleware::from_fn(student_only_middleware))
                .route_layer(auth_layer.clone()),
        )
        .route(
            "/:id",
            put(update_review)
                .delete(delete_review)
                .route_layer(middleware::from_fn(student_only_middleware))
                .route_layer(auth_layer),
        )
        .route("/trainer/:trainer_id", get(list_trainer_reviews))
        .with_state(reviews)
}

/// Submit a review for a completed session the caller attended.
#[tracing::instrument(skip(reviews, request))]
async fn create_review(
    State(reviews): State<ReviewService>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<CreateReview>,
) -> Result<(StatusCode, Json<Review>), ReviewError> {
    let review = reviews.submit_review(session.user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// Edit the caller's own review.
#[tracing::instrument(skip(reviews, request))]
async fn update_review(
    State(reviews): State<ReviewService>,
    Extension(session): Extension<UserSession>,
    Path(review_id): Path<Uuid>,
    Json(request): Json<UpdateReview>,
) -> Result<Json<Review>, ReviewError> {
    let review = reviews
        .update_review(session.user_id, review_id, &request)
        .await?;
    Ok(Json(review))
}

/// Delete the caller's own review.
#[tracing::instrument(skip(reviews))]
async fn delete_review(
    State(reviews): State<ReviewService>,
    Extension(session): Extension<UserSession>,
    Path(review_id): Path<Uuid>,
) -> Result<StatusCode, ReviewError> {
    reviews.delete_review(session.user_id, review_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Public list of a trainer's reviews.
#[tracing::instrument(skip(reviews))]
async fn list_trainer_reviews(
    State(reviews): State<ReviewService>,
    Path(trainer_id): Path<Uuid>,
) -> Result<Json<Vec<Review>>, ReviewError> {
    let result = reviews.list_for_trainer(trainer_id).await?;
    Ok(Json(result))
}

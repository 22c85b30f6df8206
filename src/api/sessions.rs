use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post, put},
    Extension, Router,
};
use uuid::Uuid;

use crate::auth::{jwt_auth_middleware, trainer_only_middleware, AuthService, UserRole, UserSession};
use crate::models::{CreateSession, Session, SessionWithStudents, TransitionSession};
use crate::services::{SessionError, SessionService};

/// Session routes. Creation and lifecycle transitions are trainer-only;
/// participants can read their own sessions.
pub fn session_routes(sessions: SessionService, auth_service: AuthService) -> Router {
    Router::new()
        .route(
            "/",
            post(create_session)
                .route_layer(middleware::from_fn(trainer_only_middleware))
                .get(list_sessions),
        )
        .route(
            "/:id/status",
            put(transition_session).route_layer(middleware::from_fn(trainer_only_middleware)),
        )
        .route("/:id", get(get_session))
        .layer(middleware::from_fn_with_state(
            auth_service,
            jwt_auth_middleware,
        ))
        .with_state(sessions)
}

/// Bind a set of completed bookings into a scheduled session.
#[tracing::instrument(skip(sessions, request))]
async fn create_session(
    State(sessions): State<SessionService>,
    Extension(session): Extension<UserSession>,
    Json(request): Json<CreateSession>,
) -> Result<(StatusCode, Json<SessionWithStudents>), SessionError> {
    let created = sessions.create_session(session.user_id, &request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Advance a session through its lifecycle.
#[tracing::instrument(skip(sessions, request))]
async fn transition_session(
    State(sessions): State<SessionService>,
    Extension(session): Extension<UserSession>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<TransitionSession>,
) -> Result<Json<Session>, SessionError> {
    let updated = sessions
        .transition(session_id, request.status, session.user_id)
        .await?;
    Ok(Json(updated))
}

/// List sessions visible to the caller.
#[tracing::instrument(skip(sessions))]
async fn list_sessions(
    State(sessions): State<SessionService>,
    Extension(session): Extension<UserSession>,
) -> Result<Json<Vec<Session>>, SessionError> {
    let result = match session.role {
        UserRole::Trainer => sessions.list_for_trainer(session.user_id).await?,
        _ => sessions.list_for_student(session.user_id).await?,
    };

    Ok(Json(result))
}

#[tracing::instrument(skip(sessions))]
async fn get_session(
    State(sessions): State<SessionService>,
    Extension(session): Extension<UserSession>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionWithStudents>, SessionError> {
    let found = sessions.get_with_students(session_id).await?;

    let allowed = session.role == UserRole::Admin
        || found.session.trainer_id == session.user_id
        || found.student_ids.contains(&session.user_id);
    if !allowed {
        return Err(SessionError::NotYourSession);
    }

    Ok(Json(found))
}

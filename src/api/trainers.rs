use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::TrainerPublic;
use crate::services::{TrainerError, TrainerService};

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    /// Maximum number of items to return (default: 50, max: 100)
    pub limit: Option<i64>,
    /// Number of items to skip (default: 0)
    pub offset: Option<i64>,
}

impl PaginationQuery {
    pub fn get_limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 100)
    }

    pub fn get_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Public trainer directory routes.
pub fn trainer_routes(trainers: TrainerService) -> Router {
    Router::new()
        .route("/", get(list_trainers))
        .route("/:id", get(get_trainer))
        .with_state(trainers)
}

/// List verified, available trainers.
#[tracing::instrument(skip(trainers))]
async fn list_trainers(
    State(trainers): State<TrainerService>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Vec<TrainerPublic>>, TrainerError> {
    let result = trainers
        .list_verified(pagination.get_limit(), pagination.get_offset())
        .await?;
    Ok(Json(result))
}

#[tracing::instrument(skip(trainers))]
async fn get_trainer(
    State(trainers): State<TrainerService>,
    Path(trainer_id): Path<Uuid>,
) -> Result<Json<TrainerPublic>, TrainerError> {
    let trainer = trainers.get_verified(trainer_id).await?;
    Ok(Json(trainer))
}

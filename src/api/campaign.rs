//! Encounter, random table and event log endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{ApiError, ApiResult, AppState};
use crate::encounter::{BuildOutcome, BuildRequest};
use crate::error::ErrorKind;
use crate::events::Event;
use crate::tables::{CreateTableOutcome, CreateTableRequest, RollTableRequest, TableRoll};

/// Most events returned by one query
const MAX_EVENT_PAGE: u32 = 200;

/// Build the campaign router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/encounter/build", post(build_encounter))
        .route("/table/create", post(create_table))
        .route("/table/roll", post(roll_table))
        .route("/events/{campaign_id}", get(recent_events))
}

async fn build_encounter(
    State(state): State<AppState>,
    payload: Result<Json<BuildRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BuildOutcome>), ApiError> {
    let Json(req) = payload?;
    let outcome = state.encounters.build(req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn create_table(
    State(state): State<AppState>,
    payload: Result<Json<CreateTableRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateTableOutcome>), ApiError> {
    let Json(req) = payload?;
    let outcome = state.tables.create(req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn roll_table(
    State(state): State<AppState>,
    payload: Result<Json<RollTableRequest>, JsonRejection>,
) -> ApiResult<TableRoll> {
    let Json(req) = payload?;
    Ok(Json(state.tables.roll(req).await?))
}

/// Event page query
#[derive(Debug, Deserialize)]
pub struct EventQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

async fn recent_events(
    Path(campaign_id): Path<String>,
    Query(query): Query<EventQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<Event>> {
    let events = state
        .event_log
        .recent(&campaign_id, query.limit.min(MAX_EVENT_PAGE))
        .await
        .map_err(|e| ApiError::new(ErrorKind::Storage, e.to_string()))?;
    Ok(Json(events))
}

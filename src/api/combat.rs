//! Combat endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use super::{ApiError, ApiResult, AppState};
use crate::combat::{
    ApplyOutcome, ApplyRequest, CombatView, NextTurnRequest, StartOutcome, StartRequest,
    TurnOutcome,
};

/// Build the combat router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/combat/start", post(start))
        .route("/combat/apply", post(apply))
        .route("/combat/next_turn", post(next_turn))
        .route("/combat/{id}", get(state))
}

async fn start(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartOutcome>), ApiError> {
    let Json(req) = payload?;
    let outcome = state.combat.start(req).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn apply(
    State(state): State<AppState>,
    payload: Result<Json<ApplyRequest>, JsonRejection>,
) -> ApiResult<ApplyOutcome> {
    let Json(req) = payload?;
    Ok(Json(state.combat.apply(req).await?))
}

async fn next_turn(
    State(state): State<AppState>,
    payload: Result<Json<NextTurnRequest>, JsonRejection>,
) -> ApiResult<TurnOutcome> {
    let Json(req) = payload?;
    Ok(Json(state.combat.next_turn(req).await?))
}

async fn state(Path(id): Path<String>, State(state): State<AppState>) -> ApiResult<CombatView> {
    Ok(Json(state.combat.state(&id).await?))
}

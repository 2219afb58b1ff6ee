//! Dice endpoint
//!
//! POST /dice/roll - Roll a notation, optionally seeded

use axum::{extract::rejection::JsonRejection, routing::post, Json, Router};
use serde::Deserialize;

use super::{ApiResult, AppState};
use crate::dice::{self, RollOptions, RollResult};

/// Build the dice router
pub fn router() -> Router<AppState> {
    Router::new().route("/dice/roll", post(roll))
}

/// Roll request
#[derive(Debug, Deserialize)]
pub struct RollRequest {
    pub notation: String,
    #[serde(flatten)]
    pub options: RollOptions,
}

async fn roll(payload: Result<Json<RollRequest>, JsonRejection>) -> ApiResult<RollResult> {
    let Json(req) = payload?;
    Ok(Json(dice::roll(&req.notation, &req.options)?))
}

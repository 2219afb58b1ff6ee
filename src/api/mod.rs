//! HTTP API module - JSON endpoints for every operation

mod campaign;
mod combat;
mod dice;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::error;

use crate::combat::{CombatError, CombatService};
use crate::db::Database;
use crate::dice::DiceError;
use crate::encounter::{EncounterError, EncounterService};
use crate::error::ErrorKind;
use crate::events::{EventLog, EventSink};
use crate::tables::{TableError, TableService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub combat: CombatService,
    pub encounters: EncounterService,
    pub tables: TableService,
    pub event_log: EventLog,
}

/// Build the API router
pub fn router(db: Arc<Database>, events: Arc<dyn EventSink>) -> Router {
    let pool = db.pool().clone();
    let state = AppState {
        combat: CombatService::new(pool.clone(), events.clone()),
        encounters: EncounterService::new(pool.clone(), events.clone()),
        tables: TableService::new(pool.clone(), events),
        event_log: EventLog::new(pool),
        db,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
        .merge(dice::router())
        .merge(combat::router())
        .merge(campaign::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Root endpoint
async fn root() -> impl IntoResponse {
    Json(RootResponse {
        name: "tabletop",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                database: "ok",
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy",
                database: "error",
            }),
        ),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
}

/// Error body: `{"kind": "...", "error": "..."}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub error: String,
}

/// A failed request
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::VersionConflict => StatusCode::CONFLICT,
            ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::MalformedNotation
            | ErrorKind::InvalidModifier
            | ErrorKind::InvalidAction
            | ErrorKind::EmptyRoster
            | ErrorKind::WrongSession
            | ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if !self.kind.is_caller_error() {
            error!("Request failed: {}", self.message);
        }
        (
            self.status(),
            Json(ErrorResponse {
                kind: self.kind,
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(ErrorKind::InvalidInput, rejection.body_text())
    }
}

macro_rules! api_error_from {
    ($($err:ty),*) => {
        $(
            impl From<$err> for ApiError {
                fn from(err: $err) -> Self {
                    ApiError::new(err.kind(), err.to_string())
                }
            }
        )*
    };
}

api_error_from!(DiceError, CombatError, EncounterError, TableError);

pub type ApiResult<T> = Result<Json<T>, ApiError>;

//! Route gateway for the probos API (EMBP).
//!
//! Each sibling module owns its endpoints and exports a subrouter; this
//! gateway merges them and attaches shared state and CORS. The handlers are
//! a thin projection: every behaviour lives in the core modules, and core
//! errors map onto distinct HTTP statuses here.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;

use crate::broadcast::Broadcaster;
use crate::error::CoreError;
use crate::ingest::Ingestor;
use crate::store::Store;
use crate::tickets::TicketManager;

mod dashboard;
mod health;
mod readings;
mod sensors;
mod tickets;
mod ws;

// ---

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub ingestor: Arc<Ingestor>,
    pub tickets: Arc<TicketManager>,
    pub broadcaster: Arc<Broadcaster>,
}

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(health::router())
        .merge(sensors::router())
        .merge(readings::router())
        .merge(dashboard::router())
        .merge(tickets::router())
        .merge(ws::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---

/// Transport-side wrapper mapping [`CoreError`] onto HTTP statuses:
/// unknown entities are 404, conflicts 409, bad payloads 422 (with the
/// `error`/`hint` body shape consumers already parse), store failures 500.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        match &self.0 {
            CoreError::UnknownSensor(_) | CoreError::UnknownTicket(_) => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": self.0.to_string() })),
            )
                .into_response(),
            CoreError::DuplicateId(_) | CoreError::InvalidTransition { .. } => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({ "error": self.0.to_string() })),
            )
                .into_response(),
            CoreError::InvalidReading { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "error": self.0.to_string(),
                    "hint": "probe values must be finite numbers",
                })),
            )
                .into_response(),
            CoreError::Scorer(detail) => {
                tracing::error!("Scorer failure surfaced to the API: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "internal scoring error" })),
                )
                    .into_response()
            }
            CoreError::Store(e) => {
                tracing::error!("Store failure surfaced to the API: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "internal storage error" })),
                )
                    .into_response()
            }
        }
    }
}

/// Handler result alias used across the route modules.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

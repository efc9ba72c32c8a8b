//! Readiness endpoint for the probos backend.
//!
//! `GET /health` answers 200 only when the store can actually serve a
//! query, so orchestrators restart the service when SQLite goes away
//! rather than routing traffic into a broken pipeline. The sensor count
//! rides along as a free sanity signal for operators.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use tracing::error;

use super::AppState;

// ---

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Registered fleet size; doubles as proof the store answered.
    sensors: i64,
}

/// Handle `GET /health`.
///
/// Runs one cheap count against the store: 200 with the fleet size when it
/// answers, 503 when persistence is unreachable. Nothing here touches the
/// ingest locks or the broadcaster, so the probe stays honest under load.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    // ---
    match state.store.sensor_count().await {
        Ok(sensors) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                sensors,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Health probe could not reach the store: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "degraded" })),
            )
                .into_response()
        }
    }
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

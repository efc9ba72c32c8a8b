//! Sensor registration, lookup and trust history endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{routing::get, routing::post, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CoreError;
use crate::models::{NewSensor, Reading, Sensor, TrustResult};

use super::{ApiResult, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/sensors", post(register).get(list))
        .route("/api/sensors/{id}", get(get_sensor))
        .route("/api/sensors/{id}/trust", get(trust_history))
}

/// Sensor metadata together with its latest reading and verdict, the shape
/// the dashboard renders per card.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SensorDetail {
    #[serde(flatten)]
    sensor: Sensor,
    latest_reading: Option<Reading>,
    latest_trust: Option<TrustResult>,
}

// ---

/// Handle `POST /api/sensors`: register a sensor. 201 on success, 409 when
/// the external id is already taken.
async fn register(
    State(state): State<AppState>,
    Json(new): Json<NewSensor>,
) -> ApiResult<impl IntoResponse> {
    // ---
    let sensor = state.store.register_sensor(&new, Utc::now()).await?;
    info!(
        "Registered sensor {} in zone {}",
        sensor.external_id, sensor.zone
    );
    Ok((StatusCode::CREATED, Json(sensor)))
}

/// Handle `GET /api/sensors`: every sensor with its latest reading and
/// verdict.
async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<SensorDetail>>> {
    // ---
    let sensors = state.store.list_sensors().await?;
    let mut details = Vec::with_capacity(sensors.len());
    for sensor in sensors {
        let latest_reading = state.store.latest_reading(sensor.id).await?;
        let latest_trust = state.store.latest_trust(sensor.id).await?;
        details.push(SensorDetail {
            sensor,
            latest_reading,
            latest_trust,
        });
    }
    Ok(Json(details))
}

/// Handle `GET /api/sensors/{id}`.
async fn get_sensor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SensorDetail>> {
    // ---
    let sensor = state
        .store
        .sensor(id)
        .await?
        .ok_or_else(|| CoreError::UnknownSensor(id.to_string()))?;
    let latest_reading = state.store.latest_reading(sensor.id).await?;
    let latest_trust = state.store.latest_trust(sensor.id).await?;
    Ok(Json(SensorDetail {
        sensor,
        latest_reading,
        latest_trust,
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

/// Handle `GET /api/sensors/{id}/trust`: verdicts newest first, up to
/// `limit` (default 20).
async fn trust_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<TrustResult>>> {
    // ---
    if state.store.sensor(id).await?.is_none() {
        return Err(CoreError::UnknownSensor(id.to_string()).into());
    }
    let limit = params.limit.unwrap_or(20);
    let history = state.store.recent_trust_results(id, limit).await?;
    Ok(Json(history))
}

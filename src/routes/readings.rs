//! Reading ingest endpoints: one at a time or batched.

use axum::extract::State;
use axum::{routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ingest::BatchItem;
use crate::models::{ReadingPayload, TrustResult};

use super::{ApiResult, AppState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/readings", post(ingest))
        .route("/api/readings/batch", post(ingest_batch))
}

/// One reading on the wire: the reporting sensor's external id plus probes
/// and context, all in one flat object.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestRequest {
    sensor_id: String,
    #[serde(flatten)]
    payload: ReadingPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IngestResponse {
    sensor_id: i64,
    reading_id: i64,
    /// `null` while the sensor has too little history to be judged.
    trust: Option<TrustResult>,
}

/// Per-item outcome of a batch ingest.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchOutcome {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reading_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trust: Option<TrustResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// ---

/// Handle `POST /api/readings`: run one reading through the full pipeline.
async fn ingest(
    State(state): State<AppState>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<Json<IngestResponse>> {
    // ---
    debug!("POST /api/readings for sensor {}", req.sensor_id);
    let outcome = state.ingestor.ingest(&req.sensor_id, req.payload).await?;
    Ok(Json(IngestResponse {
        sensor_id: outcome.sensor_id,
        reading_id: outcome.reading.id,
        trust: outcome.trust,
    }))
}

/// Handle `POST /api/readings/batch`: readings are processed sequentially
/// and each item succeeds or fails on its own.
async fn ingest_batch(
    State(state): State<AppState>,
    Json(items): Json<Vec<BatchItem>>,
) -> Json<Vec<BatchOutcome>> {
    // ---
    debug!("POST /api/readings/batch with {} items", items.len());
    let outcomes = state.ingestor.ingest_batch(items).await;
    Json(
        outcomes
            .into_iter()
            .map(|outcome| match outcome {
                Ok(o) => BatchOutcome {
                    ok: true,
                    reading_id: Some(o.reading.id),
                    trust: o.trust,
                    error: None,
                },
                Err(e) => BatchOutcome {
                    ok: false,
                    reading_id: None,
                    trust: None,
                    error: Some(e.to_string()),
                },
            })
            .collect(),
    )
}

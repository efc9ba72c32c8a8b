//! The ingest pipeline: validate → append → score → persist → reconcile.
//!
//! Each sensor behaves like its own little actor: a keyed async mutex
//! serialises the whole critical section per sensor, so two readings from
//! the same probe can never interleave their append/score/persist steps,
//! while ingests for different sensors run fully in parallel. Aggregate
//! readers bypass the locks entirely and rely on store snapshots.
//!
//! Cancellation is safe at every await: once the reading is appended it
//! stays (the log is append-only), and a cancelled ingest simply writes no
//! verdict and emits no further events.

use std::any::Any;
use std::collections::HashMap;
use std::panic;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::broadcast::Broadcaster;
use crate::config::ScoringConfig;
use crate::error::{CoreError, Result};
use crate::models::{Reading, ReadingPayload, RootCause, TrustResult, TrustStatus};
use crate::scorer;
use crate::store::Store;
use crate::tickets::TicketManager;

// ---

/// Successful ingest: the stored reading, plus the verdict when the sensor
/// had enough history to be judged.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub sensor_id: i64,
    pub reading: Reading,
    pub trust: Option<TrustResult>,
}

/// One item of a batch ingest.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    /// External id of the reporting sensor.
    pub sensor_id: String,
    #[serde(flatten)]
    pub payload: ReadingPayload,
}

/// Drives readings through the scoring pipeline.
pub struct Ingestor {
    store: Store,
    tickets: Arc<TicketManager>,
    broadcaster: Arc<Broadcaster>,
    scoring: Arc<ScoringConfig>,
    locks: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl Ingestor {
    pub fn new(
        store: Store,
        tickets: Arc<TicketManager>,
        broadcaster: Arc<Broadcaster>,
        scoring: Arc<ScoringConfig>,
    ) -> Self {
        Self {
            store,
            tickets,
            broadcaster,
            scoring,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Ingest one reading for the sensor known as `external_id`.
    ///
    /// Rejects unknown sensors and non-finite probe values before touching
    /// the store. Values that are merely outside their plausible range are
    /// stored and judged by the scorer: the cross-checks need the record to
    /// exist. Returns the verdict, or `None` while the sensor is too young.
    pub async fn ingest(&self, external_id: &str, payload: ReadingPayload) -> Result<IngestOutcome> {
        // ---
        validate_payload(&payload)?;

        let sensor = self
            .store
            .sensor_by_external(external_id)
            .await?
            .ok_or_else(|| CoreError::UnknownSensor(external_id.to_string()))?;

        let lock = self.sensor_lock(sensor.id);
        let _guard = lock.lock().await;

        let timestamp = payload.timestamp.unwrap_or_else(Utc::now);
        let reading = self.store.append_reading(sensor.id, &payload, timestamp).await?;
        self.broadcaster.reading_new(&sensor, &reading);

        let ctx = self
            .store
            .scoring_context(&sensor, &reading, &self.scoring)
            .await?;

        // The scorer is pure and cannot fail on valid input; should it
        // panic anyway, only this ingest dies. The reading stays (the log
        // is append-only), no verdict is written, no further events fire.
        let verdict = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            scorer::evaluate(&self.scoring, &ctx, Utc::now())
        }))
        .map_err(|cause| {
            let detail = describe_panic(cause.as_ref());
            error!(
                "Scorer failed on reading {} for sensor {}: {}",
                reading.id, sensor.external_id, detail
            );
            CoreError::Scorer(detail)
        })?;

        let Some(trust) = verdict else {
            debug!(
                "Sensor {} has too little history; reading {} stored without a verdict",
                sensor.external_id, reading.id
            );
            return Ok(IngestOutcome {
                sensor_id: sensor.id,
                reading,
                trust: None,
            });
        };

        self.store.save_trust_result(sensor.id, &trust).await?;
        self.broadcaster.trust_updated(&sensor, &trust);
        self.broadcaster.dashboard_update();

        info!(
            "Scored reading {} for sensor {}: {:.4} ({})",
            reading.id, sensor.external_id, trust.score, trust.label
        );

        if trust.status == TrustStatus::Anomalous
            && !trust.root_causes.contains(&RootCause::FieldEvent)
        {
            // The verdict is already persisted and is the primary record;
            // a ticket failure must not fail the ingest.
            if let Err(e) = self.tickets.on_anomalous(&sensor, &trust).await {
                error!(
                    "Ticket reconciliation failed for sensor {}: {}",
                    sensor.external_id, e
                );
            }
        }

        Ok(IngestOutcome {
            sensor_id: sensor.id,
            reading,
            trust: Some(trust),
        })
    }

    /// Ingest a batch sequentially. One failing item does not abort the
    /// others; callers get one outcome per item, in order.
    pub async fn ingest_batch(&self, items: Vec<BatchItem>) -> Vec<Result<IngestOutcome>> {
        // ---
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push(self.ingest(&item.sensor_id, item.payload).await);
        }
        outcomes
    }

    fn sensor_lock(&self, sensor_id: i64) -> Arc<Mutex<()>> {
        // ---
        let mut locks = self.locks.lock().expect("sensor lock registry poisoned");
        locks
            .entry(sensor_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

// ---

/// Best-effort text for a caught panic payload.
fn describe_panic(cause: &(dyn Any + Send)) -> String {
    // ---
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "unidentified panic".to_string()
    }
}

/// Reject payloads carrying NaN or infinite numbers. Serde already refuses
/// non-numeric JSON at the transport rim; this guards the in-process path.
fn validate_payload(payload: &ReadingPayload) -> Result<()> {
    // ---
    let probes: [(&'static str, Option<f64>); 5] = [
        ("moisture", payload.moisture),
        ("temperature", payload.temperature),
        ("ec", payload.ec),
        ("ph", payload.ph),
        ("airTemp", payload.air_temp),
    ];
    for (field, value) in probes {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(CoreError::InvalidReading { field });
            }
        }
    }
    Ok(())
}

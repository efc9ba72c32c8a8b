//! SQLite-backed persistence for sensors, readings, verdicts and tickets.
//!
//! The store is the only stateful collaborator: it is constructed once at
//! startup and passed by reference to the ingestor, the ticket manager and
//! the aggregation readers. Each method is internally atomic; the windows a
//! scoring run needs are read inside a single transaction so the scorer
//! always sees one consistent snapshot. Higher-level atomicity (append →
//! score → persist) belongs to the ingestor.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::config::ScoringConfig;
use crate::error::{CoreError, Result};
use crate::models::{
    NewSensor, Reading, ReadingPayload, Sensor, Severity, Ticket, TicketStatus,
    TrustResult,
};
use crate::scorer::{PeerContext, ScoringContext};

// ---

/// Open/in-progress/resolved ticket counts for the dashboard.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketStats {
    pub open: i64,
    pub in_progress: i64,
    pub resolved: i64,
    pub total: i64,
}

/// Handle to the backing database. Cheap to clone; all clones share one
/// connection pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if missing) the database at `url` and build the pool.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        // ---
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---

    /// Register a sensor and seed it with a fully-trusted baseline verdict.
    ///
    /// Fails with [`CoreError::DuplicateId`] when `external_id` is already
    /// taken; in that case nothing is written.
    pub async fn register_sensor(&self, new: &NewSensor, now: DateTime<Utc>) -> Result<Sensor> {
        // ---
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO sensors (external_id, zone, sensor_type, latitude, longitude, installed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.external_id)
        .bind(&new.zone)
        .bind(&new.sensor_type)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let result = match inserted {
            Ok(r) => r,
            Err(e) => {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    return Err(CoreError::DuplicateId(new.external_id.clone()));
                }
                return Err(e.into());
            }
        };
        let sensor_id = result.last_insert_rowid();

        let baseline = TrustResult::baseline(now);
        insert_trust_result(&mut *tx, sensor_id, &baseline).await?;

        tx.commit().await?;

        Ok(Sensor {
            id: sensor_id,
            external_id: new.external_id.clone(),
            zone: new.zone.clone(),
            sensor_type: new.sensor_type.clone(),
            latitude: new.latitude,
            longitude: new.longitude,
            installed_at: now,
        })
    }

    pub async fn sensor(&self, id: i64) -> Result<Option<Sensor>> {
        // ---
        let row = sqlx::query_as::<_, Sensor>("SELECT * FROM sensors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn sensor_by_external(&self, external_id: &str) -> Result<Option<Sensor>> {
        // ---
        let row = sqlx::query_as::<_, Sensor>("SELECT * FROM sensors WHERE external_id = ?")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_sensors(&self) -> Result<Vec<Sensor>> {
        // ---
        let rows = sqlx::query_as::<_, Sensor>("SELECT * FROM sensors ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Number of registered sensors. Cheap enough for readiness probes.
    pub async fn sensor_count(&self) -> Result<i64> {
        // ---
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sensors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // ---

    /// Append a reading for `sensor_id`. Fails with
    /// [`CoreError::UnknownSensor`] when the sensor does not exist.
    pub async fn append_reading(
        &self,
        sensor_id: i64,
        payload: &ReadingPayload,
        timestamp: DateTime<Utc>,
    ) -> Result<Reading> {
        // ---
        if self.sensor(sensor_id).await?.is_none() {
            return Err(CoreError::UnknownSensor(sensor_id.to_string()));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO readings
                (sensor_id, timestamp, moisture, temperature, ec, ph,
                 air_temp, is_raining, irrigation_active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sensor_id)
        .bind(timestamp)
        .bind(payload.moisture)
        .bind(payload.temperature)
        .bind(payload.ec)
        .bind(payload.ph)
        .bind(payload.air_temp)
        .bind(payload.is_raining)
        .bind(payload.irrigation_active)
        .execute(&self.pool)
        .await?;

        Ok(Reading {
            id: result.last_insert_rowid(),
            sensor_id,
            timestamp,
            moisture: payload.moisture,
            temperature: payload.temperature,
            ec: payload.ec,
            ph: payload.ph,
            air_temp: payload.air_temp,
            is_raining: payload.is_raining,
            irrigation_active: payload.irrigation_active,
        })
    }

    /// Up to `n` readings for one sensor, newest first.
    pub async fn recent_readings(&self, sensor_id: i64, n: usize) -> Result<Vec<Reading>> {
        // ---
        let rows = sqlx::query_as::<_, Reading>(
            "SELECT * FROM readings WHERE sensor_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(sensor_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn latest_reading(&self, sensor_id: i64) -> Result<Option<Reading>> {
        // ---
        let row = sqlx::query_as::<_, Reading>(
            "SELECT * FROM readings WHERE sensor_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(sensor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    // ---

    /// Everything the scorer needs for one reading, read in a single
    /// transaction: the sensor's own prior readings (newest first, up to the
    /// drift window), its recent verdicts, and for every zone peer its
    /// latest reading, its prior window and its latest score.
    pub async fn scoring_context(
        &self,
        sensor: &Sensor,
        current: &Reading,
        cfg: &ScoringConfig,
    ) -> Result<ScoringContext> {
        // ---
        let mut tx = self.pool.begin().await?;

        let history = sqlx::query_as::<_, Reading>(
            "SELECT * FROM readings WHERE sensor_id = ? AND id < ? ORDER BY id DESC LIMIT ?",
        )
        .bind(sensor.id)
        .bind(current.id)
        .bind(cfg.drift_window as i64)
        .fetch_all(&mut *tx)
        .await?;

        let trust_rows = sqlx::query(
            "SELECT detail FROM trust_results WHERE sensor_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(sensor.id)
        .bind(cfg.trend_window as i64)
        .fetch_all(&mut *tx)
        .await?;
        let mut recent_trust = Vec::with_capacity(trust_rows.len());
        for row in trust_rows {
            recent_trust.push(decode_detail(row.get::<String, _>(0))?);
        }

        let peer_sensors = sqlx::query_as::<_, Sensor>(
            "SELECT * FROM sensors WHERE zone = ? AND id != ? ORDER BY id",
        )
        .bind(&sensor.zone)
        .bind(sensor.id)
        .fetch_all(&mut *tx)
        .await?;

        let mut peers = Vec::with_capacity(peer_sensors.len());
        for peer in &peer_sensors {
            let mut readings = sqlx::query_as::<_, Reading>(
                "SELECT * FROM readings WHERE sensor_id = ? ORDER BY id DESC LIMIT ?",
            )
            .bind(peer.id)
            .bind((cfg.history_window + 1) as i64)
            .fetch_all(&mut *tx)
            .await?;

            // A peer that has never reported contributes nothing to the
            // cross-zone axis, but its baseline score still counts toward
            // zone reliability.
            let latest_score = sqlx::query_scalar::<_, f64>(
                "SELECT score FROM trust_results WHERE sensor_id = ? ORDER BY id DESC LIMIT 1",
            )
            .bind(peer.id)
            .fetch_optional(&mut *tx)
            .await?;

            if readings.is_empty() {
                peers.push(PeerContext {
                    sensor_id: peer.id,
                    latest: None,
                    history: Vec::new(),
                    latest_score,
                });
                continue;
            }
            let latest = readings.remove(0);
            peers.push(PeerContext {
                sensor_id: peer.id,
                latest: Some(latest),
                history: readings,
                latest_score,
            });
        }

        tx.commit().await?;

        Ok(ScoringContext {
            current: current.clone(),
            history,
            peers,
            recent_trust,
        })
    }

    // ---

    /// Persist a verdict (append-only).
    pub async fn save_trust_result(&self, sensor_id: i64, trust: &TrustResult) -> Result<i64> {
        // ---
        let id = insert_trust_result(&self.pool, sensor_id, trust).await?;
        Ok(id)
    }

    /// Up to `n` verdicts for one sensor, newest first.
    pub async fn recent_trust_results(&self, sensor_id: i64, n: usize) -> Result<Vec<TrustResult>> {
        // ---
        let rows = sqlx::query(
            "SELECT detail FROM trust_results WHERE sensor_id = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(sensor_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| decode_detail(row.get::<String, _>(0)))
            .collect()
    }

    pub async fn latest_trust(&self, sensor_id: i64) -> Result<Option<TrustResult>> {
        // ---
        let row = sqlx::query(
            "SELECT detail FROM trust_results WHERE sensor_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(sensor_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| decode_detail(r.get::<String, _>(0))).transpose()
    }

    // ---

    /// The sensor's Open ticket, if any. By construction there is at most
    /// one.
    pub async fn open_ticket_for_sensor(&self, sensor_id: i64) -> Result<Option<Ticket>> {
        // ---
        let row = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE sensor_id = ? AND status = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(sensor_id)
        .bind(TicketStatus::Open)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn insert_ticket(
        &self,
        sensor_id: i64,
        issue: &str,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Result<Ticket> {
        // ---
        let result = sqlx::query(
            r#"
            INSERT INTO tickets (sensor_id, issue, severity, status, created_at, resolved_at)
            VALUES (?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(sensor_id)
        .bind(issue)
        .bind(severity)
        .bind(TicketStatus::Open)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Ticket {
            id: result.last_insert_rowid(),
            sensor_id,
            issue: issue.to_string(),
            severity,
            status: TicketStatus::Open,
            created_at: now,
            resolved_at: None,
        })
    }

    pub async fn update_ticket(&self, ticket: &Ticket) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            UPDATE tickets
            SET issue = ?, severity = ?, status = ?, resolved_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&ticket.issue)
        .bind(ticket.severity)
        .bind(ticket.status)
        .bind(ticket.resolved_at)
        .bind(ticket.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn ticket(&self, id: i64) -> Result<Option<Ticket>> {
        // ---
        let row = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_tickets(&self, status: Option<TicketStatus>) -> Result<Vec<Ticket>> {
        // ---
        let rows = match status {
            Some(s) => {
                sqlx::query_as::<_, Ticket>(
                    "SELECT * FROM tickets WHERE status = ? ORDER BY id DESC",
                )
                .bind(s)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Ticket>("SELECT * FROM tickets ORDER BY id DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows)
    }

    pub async fn ticket_stats(&self) -> Result<TicketStats> {
        // ---
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM tickets GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = TicketStats {
            open: 0,
            in_progress: 0,
            resolved: 0,
            total: 0,
        };
        for row in rows {
            let status: TicketStatus = row.get("status");
            let n: i64 = row.get("n");
            match status {
                TicketStatus::Open => stats.open = n,
                TicketStatus::InProgress => stats.in_progress = n,
                TicketStatus::Resolved => stats.resolved = n,
            }
            stats.total += n;
        }
        Ok(stats)
    }
}

// ---

async fn insert_trust_result<'e, E>(executor: E, sensor_id: i64, trust: &TrustResult) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    // ---
    let detail =
        serde_json::to_string(trust).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO trust_results (sensor_id, score, status, severity, evaluated_at, detail)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(sensor_id)
    .bind(trust.score)
    .bind(trust.status)
    .bind(trust.severity)
    .bind(trust.evaluated_at)
    .bind(detail)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

fn decode_detail(detail: String) -> Result<TrustResult> {
    // ---
    serde_json::from_str(&detail)
        .map_err(|e| CoreError::Store(sqlx::Error::Decode(Box::new(e))))
}

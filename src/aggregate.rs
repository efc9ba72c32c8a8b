//! Aggregation readers for the dashboard.
//!
//! These bypass the per-sensor ingest locks and read straight from the
//! store: the latest verdict per sensor, folded into fleet-wide and
//! per-zone counts.

use std::collections::BTreeMap;

use serde::Serialize;
use sqlx::Row;

use crate::error::Result;
use crate::models::{Severity, TrustStatus};
use crate::store::{Store, TicketStats};

// ---

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
    pub healthy: i64,
    pub warning: i64,
    pub anomalous: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SeverityCounts {
    pub none: i64,
    pub low: i64,
    pub medium: i64,
    pub high: i64,
    pub critical: i64,
}

/// Fleet-wide counts by latest status and severity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_sensors: i64,
    pub by_status: StatusCounts,
    pub by_severity: SeverityCounts,
    pub tickets: TicketStats,
}

/// Per-zone health counts, keyed by the operator's zone tag.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneStats {
    pub zone: String,
    pub healthy: i64,
    pub warning: i64,
    pub anomalous: i64,
    pub total: i64,
}

// ---

/// Latest (zone, status, severity) per sensor. Every sensor has at least
/// its registration baseline, so each one contributes exactly one row.
async fn latest_verdict_rows(store: &Store) -> Result<Vec<(String, TrustStatus, Severity)>> {
    // ---
    let rows = sqlx::query(
        r#"
        SELECT s.zone AS zone, t.status AS status, t.severity AS severity
        FROM sensors s
        JOIN trust_results t ON t.sensor_id = s.id
        JOIN (
            SELECT sensor_id, MAX(id) AS latest_id
            FROM trust_results
            GROUP BY sensor_id
        ) latest ON latest.sensor_id = t.sensor_id AND latest.latest_id = t.id
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| (row.get("zone"), row.get("status"), row.get("severity")))
        .collect())
}

/// Counts by status and by severity across the whole fleet.
pub async fn dashboard_summary(store: &Store) -> Result<DashboardSummary> {
    // ---
    let rows = latest_verdict_rows(store).await?;

    let mut by_status = StatusCounts::default();
    let mut by_severity = SeverityCounts::default();
    for (_, status, severity) in &rows {
        match status {
            TrustStatus::Healthy => by_status.healthy += 1,
            TrustStatus::Warning => by_status.warning += 1,
            TrustStatus::Anomalous => by_status.anomalous += 1,
        }
        match severity {
            Severity::None => by_severity.none += 1,
            Severity::Low => by_severity.low += 1,
            Severity::Medium => by_severity.medium += 1,
            Severity::High => by_severity.high += 1,
            Severity::Critical => by_severity.critical += 1,
        }
    }

    Ok(DashboardSummary {
        total_sensors: rows.len() as i64,
        by_status,
        by_severity,
        tickets: store.ticket_stats().await?,
    })
}

/// Health counts grouped by zone, sorted by zone tag.
pub async fn zone_statistics(store: &Store) -> Result<Vec<ZoneStats>> {
    // ---
    let rows = latest_verdict_rows(store).await?;

    let mut zones: BTreeMap<String, ZoneStats> = BTreeMap::new();
    for (zone, status, _) in rows {
        let entry = zones.entry(zone.clone()).or_insert_with(|| ZoneStats {
            zone,
            healthy: 0,
            warning: 0,
            anomalous: 0,
            total: 0,
        });
        match status {
            TrustStatus::Healthy => entry.healthy += 1,
            TrustStatus::Warning => entry.warning += 1,
            TrustStatus::Anomalous => entry.anomalous += 1,
        }
        entry.total += 1;
    }

    Ok(zones.into_values().collect())
}

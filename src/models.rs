//! Domain types for the trust pipeline.
//!
//! Everything here is plain data: handles are `i64` row ids, cross-entity
//! links are ids (never back-pointers), and wire names are camelCase to
//! stay compatible with existing dashboard consumers.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// One of the four measured quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Moisture,
    Temperature,
    Ec,
    Ph,
}

impl Parameter {
    /// Fixed iteration order used everywhere scores are assembled, so that
    /// identical inputs always produce identical output.
    pub const ALL: [Parameter; 4] = [
        Parameter::Moisture,
        Parameter::Temperature,
        Parameter::Ec,
        Parameter::Ph,
    ];

    /// Wire/flag name of the probe.
    pub fn name(self) -> &'static str {
        match self {
            Parameter::Moisture => "moisture",
            Parameter::Temperature => "temperature",
            Parameter::Ec => "ec",
            Parameter::Ph => "ph",
        }
    }
}

// ---

/// A registered sensor. Identity is the opaque `external_id`; `zone` groups
/// sensors for cross-correlation and is the only mutable attribute.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Sensor {
    pub id: i64,

    /// Natural key from the field deployment (e.g. `s_23`).
    pub external_id: String,

    /// Operator-assigned grouping used solely for cross-sensor correlation.
    pub zone: String,

    /// Hardware family tag; passed through unchanged.
    pub sensor_type: String,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub installed_at: DateTime<Utc>,
}

/// Registration input for a new sensor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSensor {
    pub external_id: String,
    pub zone: String,
    #[serde(rename = "type")]
    pub sensor_type: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

// ---

/// Reading as submitted by a sensor (wire format). All probes are optional:
/// a multi-probe head may report any subset, and context fields arrive only
/// when the gateway knows them.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPayload {
    /// Capture time; ingest time is used when absent.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Volumetric water content, % (plausible range 0–100).
    #[serde(default)]
    pub moisture: Option<f64>,

    /// Soil temperature, °C (plausible range 0–60).
    #[serde(default)]
    pub temperature: Option<f64>,

    /// Electrical conductivity, mS/cm (plausible range 0–10).
    #[serde(default)]
    pub ec: Option<f64>,

    /// Soil pH (plausible range 3–10).
    #[serde(default)]
    pub ph: Option<f64>,

    /// Air temperature at the field station, °C.
    #[serde(default)]
    pub air_temp: Option<f64>,

    #[serde(default)]
    pub is_raining: Option<bool>,

    #[serde(default)]
    pub irrigation_active: Option<bool>,
}

/// A stored reading. Append-only; never edited after insert.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: i64,
    pub sensor_id: i64,
    pub timestamp: DateTime<Utc>,
    pub moisture: Option<f64>,
    pub temperature: Option<f64>,
    pub ec: Option<f64>,
    pub ph: Option<f64>,
    pub air_temp: Option<f64>,
    pub is_raining: Option<bool>,
    pub irrigation_active: Option<bool>,
}

impl Reading {
    /// Probe value by parameter, if this reading carries it.
    pub fn value(&self, p: Parameter) -> Option<f64> {
        match p {
            Parameter::Moisture => self.moisture,
            Parameter::Temperature => self.temperature,
            Parameter::Ec => self.ec,
            Parameter::Ph => self.ph,
        }
    }
}

// ---

/// Overall health band of a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TrustStatus {
    Healthy,
    Warning,
    Anomalous,
}

impl TrustStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrustStatus::Healthy => "healthy",
            TrustStatus::Warning => "warning",
            TrustStatus::Anomalous => "anomalous",
        }
    }
}

/// Operational urgency of a fault. Ordered `None < Low < Medium < High <
/// Critical`, so an existing ticket's severity can only be raised with `max`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Severity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Why a score deviated from 1.0. Closed set; a verdict carries `Normal`
/// exactly when it carries nothing else.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum RootCause {
    Normal,
    Spike,
    Static,
    Drift,
    ZoneMismatch,
    WeatherMismatch,
    FieldEvent,
    ImpossibleValue,
}

impl RootCause {
    /// Human-readable name used in ticket issues.
    pub fn label(self) -> &'static str {
        match self {
            RootCause::Normal => "normal",
            RootCause::Spike => "spike",
            RootCause::Static => "static value",
            RootCause::Drift => "drift",
            RootCause::ZoneMismatch => "zone mismatch",
            RootCause::WeatherMismatch => "weather mismatch",
            RootCause::FieldEvent => "field event",
            RootCause::ImpossibleValue => "impossible value",
        }
    }
}

/// Direction the sensor's trust has been moving over its recent verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthTrend {
    Improving,
    Degrading,
    Stable,
    Unknown,
}

// ---

/// Sub-scores for one probe: how it fared against its own history, against
/// its zone neighbours, the shared physical-plausibility score, and the
/// weighted per-parameter aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamDiagnosis {
    pub temporal_score: f64,
    pub temporal_cause: RootCause,
    pub cross_score: f64,
    pub cross_cause: RootCause,
    pub physical_score: f64,
    pub param_trust: f64,
}

impl ParamDiagnosis {
    /// Diagnosis of a probe with nothing against it.
    pub fn clean() -> Self {
        Self {
            temporal_score: 1.0,
            temporal_cause: RootCause::Normal,
            cross_score: 1.0,
            cross_cause: RootCause::Normal,
            physical_score: 1.0,
            param_trust: 1.0,
        }
    }
}

/// Per-probe diagnoses, one for each of the four parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerParameter {
    pub moisture: ParamDiagnosis,
    pub temperature: ParamDiagnosis,
    pub ec: ParamDiagnosis,
    pub ph: ParamDiagnosis,
}

impl PerParameter {
    pub fn get(&self, p: Parameter) -> &ParamDiagnosis {
        match p {
            Parameter::Moisture => &self.moisture,
            Parameter::Temperature => &self.temperature,
            Parameter::Ec => &self.ec,
            Parameter::Ph => &self.ph,
        }
    }

    /// Diagnoses in the fixed parameter order.
    pub fn values(&self) -> [&ParamDiagnosis; 4] {
        [&self.moisture, &self.temperature, &self.ec, &self.ph]
    }
}

/// The verdict for one (sensor, reading) pair. Scores are rounded to four
/// fractional digits before this struct is persisted or compared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustResult {
    /// Aggregate sensor trust in [0, 1]; the unweighted mean of the four
    /// per-parameter aggregates.
    pub score: f64,

    pub status: TrustStatus,

    /// Human-readable band name for `score`.
    pub label: String,

    pub severity: Severity,

    pub per_parameter: PerParameter,

    /// Non-empty; contains `Normal` iff it contains nothing else.
    pub root_causes: BTreeSet<RootCause>,

    pub health_trend: HealthTrend,

    /// Regression slope of recent verdict scores, chronological order.
    pub trend_slope: f64,

    /// Fraction of recent verdicts that were Anomalous, in [0, 1].
    pub anomaly_rate: f64,

    pub irrigation_safe: bool,

    pub failure_prediction: Option<String>,

    pub confidence_level: f64,

    /// Mean of the latest scores of the other sensors in the same zone, or
    /// `None` when no peer has a verdict.
    pub zone_reliability: Option<f64>,

    pub sustainability_insight: Option<String>,

    pub alert_tag: Option<String>,

    /// One short line per penalty, in the order they were applied.
    pub flags: Vec<String>,

    pub evaluated_at: DateTime<Utc>,
}

impl TrustResult {
    /// The verdict a sensor starts with at registration: fully trusted,
    /// nothing known about its trend yet.
    pub fn baseline(now: DateTime<Utc>) -> Self {
        let mut root_causes = BTreeSet::new();
        root_causes.insert(RootCause::Normal);
        Self {
            score: 1.0,
            status: TrustStatus::Healthy,
            label: "Highly Reliable".to_string(),
            severity: Severity::None,
            per_parameter: PerParameter {
                moisture: ParamDiagnosis::clean(),
                temperature: ParamDiagnosis::clean(),
                ec: ParamDiagnosis::clean(),
                ph: ParamDiagnosis::clean(),
            },
            root_causes,
            health_trend: HealthTrend::Unknown,
            trend_slope: 0.0,
            anomaly_rate: 0.0,
            irrigation_safe: true,
            failure_prediction: None,
            confidence_level: 0.9,
            zone_reliability: None,
            sustainability_insight: None,
            alert_tag: None,
            flags: Vec::new(),
            evaluated_at: now,
        }
    }
}

// ---

/// Lifecycle state of a maintenance ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "camelCase")]
#[sqlx(rename_all = "camelCase")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "inProgress",
            TicketStatus::Resolved => "resolved",
        }
    }

    /// Whether the ticket machine permits `self -> to`. Open may move to
    /// either later state; InProgress only forward; Resolved is terminal.
    pub fn can_transition(self, to: TicketStatus) -> bool {
        matches!(
            (self, to),
            (TicketStatus::Open, TicketStatus::InProgress)
                | (TicketStatus::Open, TicketStatus::Resolved)
                | (TicketStatus::InProgress, TicketStatus::Resolved)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A maintenance ticket. Outlives the readings that created it; at most one
/// Open ticket exists per sensor at any time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: i64,
    pub sensor_id: i64,
    pub issue: String,
    pub severity: Severity,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly when `status` is Resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn severity_orders_for_monotonic_raise() {
        // ---
        assert!(Severity::None < Severity::Low);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::High.max(Severity::Medium), Severity::High);
    }

    #[test]
    fn ticket_machine_permits_only_forward_moves() {
        // ---
        assert!(TicketStatus::Open.can_transition(TicketStatus::InProgress));
        assert!(TicketStatus::Open.can_transition(TicketStatus::Resolved));
        assert!(TicketStatus::InProgress.can_transition(TicketStatus::Resolved));

        assert!(!TicketStatus::Resolved.can_transition(TicketStatus::Open));
        assert!(!TicketStatus::Resolved.can_transition(TicketStatus::InProgress));
        assert!(!TicketStatus::InProgress.can_transition(TicketStatus::Open));
        assert!(!TicketStatus::Open.can_transition(TicketStatus::Open));
    }

    #[test]
    fn root_causes_use_wire_names() {
        // ---
        assert_eq!(
            serde_json::to_string(&RootCause::ZoneMismatch).unwrap(),
            "\"zoneMismatch\""
        );
        assert_eq!(
            serde_json::to_string(&RootCause::ImpossibleValue).unwrap(),
            "\"impossibleValue\""
        );
    }

    #[test]
    fn reading_exposes_probes_by_parameter() {
        // ---
        let r = Reading {
            id: 1,
            sensor_id: 1,
            timestamp: Utc::now(),
            moisture: Some(30.0),
            temperature: None,
            ec: Some(1.2),
            ph: Some(6.5),
            air_temp: None,
            is_raining: None,
            irrigation_active: None,
        };
        assert_eq!(r.value(Parameter::Moisture), Some(30.0));
        assert_eq!(r.value(Parameter::Temperature), None);
        assert_eq!(r.value(Parameter::Ec), Some(1.2));
        assert_eq!(r.value(Parameter::Ph), Some(6.5));
    }

    #[test]
    fn baseline_verdict_is_fully_trusted() {
        // ---
        let b = TrustResult::baseline(Utc::now());
        assert_eq!(b.score, 1.0);
        assert_eq!(b.status, TrustStatus::Healthy);
        assert_eq!(b.severity, Severity::None);
        assert!(b.root_causes.contains(&RootCause::Normal));
        assert_eq!(b.root_causes.len(), 1);
        assert!(b.irrigation_safe);
    }
}

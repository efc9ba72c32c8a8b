//! The pure reading → verdict function.
//!
//! Given one reading plus the windows the store sampled for it, `evaluate`
//! produces a complete [`TrustResult`], or `None` while the sensor is too
//! young to judge. Three axes are scored for every probe:
//!
//! - **temporal** ([`temporal`]): the probe against its own recent history
//!   (static detection, drift regression, percentage-change bands);
//! - **cross-zone** ([`cross`]): the probe against the latest values of the
//!   other sensors in the same zone, with a field-event check that tells a
//!   lone faulty sensor apart from rain moving the whole zone;
//! - **physical** ([`physical`]): hard plausibility bounds and
//!   weather/agronomy penalties, computed once per reading and shared by
//!   all four probes.
//!
//! The module has no state and never suspends; identical inputs produce
//! identical output (scores are rounded to four fractional digits before
//! they leave this module).

mod cross;
mod physical;
mod temporal;
mod trend;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;
use crate::models::{
    HealthTrend, ParamDiagnosis, Parameter, PerParameter, Reading, RootCause,
    Severity, TrustResult, TrustStatus,
};

// ---

/// A sensor must have this many stored readings (counting the one being
/// scored) before verdicts are produced.
pub const MIN_READINGS_FOR_VERDICT: usize = 5;

/// Aggregate trust at or above this, with no impossible value and no zone
/// mismatch, keeps irrigation decisions on.
const IRRIGATION_SAFE_FLOOR: f64 = 0.75;

/// Trend slope below this predicts failure outright.
const RAPID_DEGRADATION_SLOPE: f64 = -0.03;

/// Anomaly-rate cut-off for the degrading-trend failure prediction.
const DEGRADING_ANOMALY_RATE: f64 = 0.3;

// ---

/// One zone neighbour as sampled by the store: its latest reading (if it
/// ever reported), the prior readings behind that, and its latest score.
#[derive(Debug, Clone)]
pub struct PeerContext {
    pub sensor_id: i64,
    /// Newest reading; `None` for a registered peer that never reported.
    pub latest: Option<Reading>,
    /// Readings before `latest`, newest first.
    pub history: Vec<Reading>,
    /// Score of the peer's latest verdict, if it has one.
    pub latest_score: Option<f64>,
}

/// Everything `evaluate` looks at, sampled in one consistent snapshot.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub current: Reading,
    /// The subject sensor's prior readings, newest first.
    pub history: Vec<Reading>,
    /// The other sensors in the same zone, ordered by id.
    pub peers: Vec<PeerContext>,
    /// The subject sensor's recent verdicts, newest first.
    pub recent_trust: Vec<TrustResult>,
}

/// Outcome of one scoring axis for one probe.
#[derive(Debug, Clone)]
pub(crate) struct AxisScore {
    pub score: f64,
    pub cause: RootCause,
    pub flag: Option<String>,
}

impl AxisScore {
    pub(crate) fn clean() -> Self {
        Self {
            score: 1.0,
            cause: RootCause::Normal,
            flag: None,
        }
    }
}

// ---

/// Score one reading. Returns `None` while the sensor has fewer than
/// [`MIN_READINGS_FOR_VERDICT`] stored readings; the caller then skips
/// verdict persistence and ticket logic for this reading.
pub fn evaluate(
    cfg: &ScoringConfig,
    ctx: &ScoringContext,
    now: DateTime<Utc>,
) -> Option<TrustResult> {
    // ---
    if ctx.history.len() + 1 < MIN_READINGS_FOR_VERDICT {
        return None;
    }

    let physical = physical::assess(cfg, &ctx.current, ctx.history.first());

    let mut causes: BTreeSet<RootCause> = BTreeSet::new();
    let mut flags: Vec<String> = Vec::new();

    let mut diagnose = |p: Parameter| -> ParamDiagnosis {
        let t = temporal::assess(cfg, p, &ctx.current, &ctx.history);
        let c = cross::assess(cfg, p, &ctx.current, &ctx.peers);

        if t.cause != RootCause::Normal {
            causes.insert(t.cause);
        }
        if c.cause != RootCause::Normal {
            causes.insert(c.cause);
        }
        flags.extend(t.flag);
        flags.extend(c.flag);

        let w = &cfg.weights;
        ParamDiagnosis {
            temporal_score: t.score,
            temporal_cause: t.cause,
            cross_score: c.score,
            cross_cause: c.cause,
            physical_score: physical.score,
            param_trust: round4(
                w.temporal * t.score + w.cross * c.score + w.physical * physical.score,
            ),
        }
    };

    // Fixed parameter order keeps causes, flags and scores reproducible.
    let per_parameter = PerParameter {
        moisture: diagnose(Parameter::Moisture),
        temperature: diagnose(Parameter::Temperature),
        ec: diagnose(Parameter::Ec),
        ph: diagnose(Parameter::Ph),
    };

    causes.extend(physical.causes.iter().copied());
    flags.extend(physical.flags.iter().cloned());

    if causes.is_empty() {
        causes.insert(RootCause::Normal);
    }

    let score = round4(
        per_parameter
            .values()
            .iter()
            .map(|d| d.param_trust)
            .sum::<f64>()
            / 4.0,
    );
    let (status, label) = band(cfg, score);
    let severity = severity(&causes, score);

    let trend = trend::assess(&ctx.recent_trust);

    let irrigation_safe = score >= IRRIGATION_SAFE_FLOOR
        && !causes.contains(&RootCause::ImpossibleValue)
        && !causes.contains(&RootCause::ZoneMismatch);

    let failure_prediction = if trend.slope < RAPID_DEGRADATION_SLOPE {
        Some("Rapid degradation detected; schedule maintenance before the sensor fails".to_string())
    } else if trend.trend == HealthTrend::Degrading && trend.anomaly_rate > DEGRADING_ANOMALY_RATE {
        Some("Trust is degrading with repeated anomalies; inspection recommended".to_string())
    } else {
        None
    };

    let confidence_level = if score > 0.85 {
        0.9
    } else if score > 0.70 {
        0.6
    } else {
        0.3
    };

    let peer_scores: Vec<f64> = ctx.peers.iter().filter_map(|p| p.latest_score).collect();
    let zone_reliability = if peer_scores.is_empty() {
        None
    } else {
        Some(round4(peer_scores.iter().sum::<f64>() / peer_scores.len() as f64))
    };

    let sustainability_insight = if ctx.current.irrigation_active == Some(true) && !irrigation_safe
    {
        Some(
            "Irrigation is running on a reading that cannot be trusted; consider pausing the cycle"
                .to_string(),
        )
    } else {
        None
    };

    let alert_tag = match severity {
        Severity::Critical => Some("Immediate attention required".to_string()),
        Severity::High => Some("Urgent maintenance required".to_string()),
        Severity::Medium => Some("Monitor sensor".to_string()),
        Severity::Low | Severity::None => None,
    };

    Some(TrustResult {
        score,
        status,
        label: label.to_string(),
        severity,
        per_parameter,
        root_causes: causes,
        health_trend: trend.trend,
        trend_slope: round4(trend.slope),
        anomaly_rate: round4(trend.anomaly_rate),
        irrigation_safe,
        failure_prediction,
        confidence_level,
        zone_reliability,
        sustainability_insight,
        alert_tag,
        flags,
        evaluated_at: now,
    })
}

// ---

/// Band an aggregate score into status and label. Bounds are inclusive at
/// the top of each band.
pub fn band(cfg: &ScoringConfig, score: f64) -> (TrustStatus, &'static str) {
    // ---
    let b = &cfg.trust_bands;
    if score >= b.highly_reliable {
        (TrustStatus::Healthy, "Highly Reliable")
    } else if score >= b.reliable {
        (TrustStatus::Healthy, "Reliable")
    } else if score >= b.uncertain {
        (TrustStatus::Warning, "Uncertain")
    } else if score >= b.unreliable {
        (TrustStatus::Anomalous, "Unreliable")
    } else {
        (TrustStatus::Anomalous, "Anomaly")
    }
}

/// Severity cascade; first match wins.
fn severity(causes: &BTreeSet<RootCause>, score: f64) -> Severity {
    // ---
    if causes.contains(&RootCause::ImpossibleValue) {
        Severity::Critical
    } else if score < 0.15 {
        Severity::Critical
    } else if causes.contains(&RootCause::ZoneMismatch) && score < 0.5 {
        Severity::High
    } else if causes.contains(&RootCause::Spike) && score < 0.5 {
        Severity::High
    } else if causes.contains(&RootCause::Static) {
        Severity::High
    } else if causes.contains(&RootCause::Drift) {
        Severity::Medium
    } else if causes.contains(&RootCause::WeatherMismatch) {
        Severity::Medium
    } else if score < 0.65 {
        Severity::Low
    } else {
        Severity::None
    }
}

/// Round to four fractional digits; applied to every score that leaves the
/// scorer so persisted verdicts compare exactly.
pub(crate) fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Least-squares slope of `values` against their index, centred so the
/// degenerate cases (fewer than two points, zero variance in x) return 0.
pub(crate) fn regression_slope(values: &[f64]) -> f64 {
    // ---
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mid = (n as f64 - 1.0) / 2.0;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, v) in values.iter().enumerate() {
        let x = i as f64 - mid;
        num += x * v;
        den += x * x;
    }
    if den == 0.0 {
        return 0.0;
    }
    num / den
}

#[cfg(test)]
pub(crate) mod testutil {
    // ---
    use chrono::{Duration, TimeZone, Utc};

    use crate::models::Reading;

    /// A reading `idx` hours into the synthetic trace.
    pub fn reading(idx: i64, moisture: f64, temperature: f64, ec: f64, ph: f64) -> Reading {
        // ---
        Reading {
            id: idx + 1,
            sensor_id: 1,
            timestamp: Utc.with_ymd_and_hms(2026, 2, 20, 0, 0, 0).unwrap() + Duration::hours(idx),
            moisture: Some(moisture),
            temperature: Some(temperature),
            ec: Some(ec),
            ph: Some(ph),
            air_temp: None,
            is_raining: None,
            irrigation_active: None,
        }
    }

    /// `n` steady readings, newest first, with a deterministic wiggle large
    /// enough to clear the static thresholds on every probe.
    pub fn steady_history(n: usize) -> Vec<Reading> {
        // ---
        (0..n as i64)
            .map(|i| {
                let wiggle = if i % 2 == 0 { 1.0 } else { -1.0 };
                reading(
                    n as i64 - i,
                    30.0 + wiggle,
                    22.0 + 0.3 * wiggle,
                    1.2 + 0.03 * wiggle,
                    6.5 + 0.03 * wiggle,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::testutil::{reading, steady_history};
    use super::*;

    fn ctx_with_history(current: Reading, history: Vec<Reading>) -> ScoringContext {
        // ---
        ScoringContext {
            current,
            history,
            peers: Vec::new(),
            recent_trust: Vec::new(),
        }
    }

    #[test]
    fn regression_slope_handles_degenerate_input() {
        // ---
        assert_eq!(regression_slope(&[]), 0.0);
        assert_eq!(regression_slope(&[1.0]), 0.0);
        assert_eq!(regression_slope(&[2.0, 2.0, 2.0]), 0.0);
        let s = regression_slope(&[0.0, 1.0, 2.0, 3.0]);
        assert!((s - 1.0).abs() < 1e-12);
    }

    #[test]
    fn young_sensor_gets_no_verdict_until_fifth_reading() {
        // ---
        let cfg = ScoringConfig::default();
        let now = Utc::now();

        // Three priors + current = four stored readings: still too young.
        let ctx = ctx_with_history(reading(4, 30.0, 22.0, 1.2, 6.5), steady_history(3));
        assert!(evaluate(&cfg, &ctx, now).is_none());

        // Four priors + current = five stored readings: first verdict.
        let ctx = ctx_with_history(reading(5, 30.0, 22.0, 1.2, 6.5), steady_history(4));
        assert!(evaluate(&cfg, &ctx, now).is_some());
    }

    #[test]
    fn steady_sensor_scores_perfect_trust() {
        // ---
        let cfg = ScoringConfig::default();
        let ctx = ctx_with_history(reading(11, 30.5, 22.1, 1.22, 6.5), steady_history(10));
        let verdict = evaluate(&cfg, &ctx, Utc::now()).unwrap();

        assert_eq!(verdict.score, 1.0);
        assert_eq!(verdict.status, TrustStatus::Healthy);
        assert_eq!(verdict.label, "Highly Reliable");
        assert_eq!(verdict.severity, Severity::None);
        assert_eq!(
            verdict.root_causes.iter().copied().collect::<Vec<_>>(),
            vec![RootCause::Normal]
        );
        assert!(verdict.irrigation_safe);
        assert!(verdict.flags.is_empty());
        for d in verdict.per_parameter.values() {
            assert_eq!(d.param_trust, 1.0);
        }
    }

    #[test]
    fn score_is_mean_of_param_trusts() {
        // ---
        let cfg = ScoringConfig::default();
        // Moisture spikes; everything else stays put.
        let ctx = ctx_with_history(reading(11, 55.0, 22.0, 1.2, 6.5), steady_history(10));
        let verdict = evaluate(&cfg, &ctx, Utc::now()).unwrap();

        let mean: f64 = verdict
            .per_parameter
            .values()
            .iter()
            .map(|d| d.param_trust)
            .sum::<f64>()
            / 4.0;
        assert!((verdict.score - mean).abs() < 1e-4);
        assert!(verdict.score >= 0.0 && verdict.score <= 1.0);
    }

    #[test]
    fn root_causes_never_empty_and_normal_is_exclusive() {
        // ---
        let cfg = ScoringConfig::default();

        let clean = evaluate(
            &cfg,
            &ctx_with_history(reading(11, 30.0, 22.0, 1.2, 6.5), steady_history(10)),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(clean.root_causes.len(), 1);
        assert!(clean.root_causes.contains(&RootCause::Normal));

        let spiky = evaluate(
            &cfg,
            &ctx_with_history(reading(11, 92.0, 22.0, 1.2, 6.5), steady_history(10)),
            Utc::now(),
        )
        .unwrap();
        assert!(!spiky.root_causes.is_empty());
        assert!(!spiky.root_causes.contains(&RootCause::Normal));
    }

    #[test]
    fn evaluate_is_deterministic() {
        // ---
        let cfg = ScoringConfig::default();
        let now = Utc::now();
        let ctx = ctx_with_history(reading(11, 92.0, 22.0, 3.1, 8.3), steady_history(10));

        let a = evaluate(&cfg, &ctx, now).unwrap();
        let b = evaluate(&cfg, &ctx, now).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn severity_is_monotonic_in_score_for_fixed_causes() {
        // ---
        use std::collections::BTreeSet;
        let causes: BTreeSet<RootCause> = [RootCause::Spike].into_iter().collect();

        let rank = |s: Severity| s as u8;
        let mut last = u8::MAX;
        for score in [0.1, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let sev = rank(severity(&causes, score));
            assert!(sev <= last, "severity must not rise with score");
            last = sev;
        }
    }

    #[test]
    fn bands_assign_uniquely_at_boundaries() {
        // ---
        let cfg = ScoringConfig::default();
        assert_eq!(band(&cfg, 1.0), (TrustStatus::Healthy, "Highly Reliable"));
        assert_eq!(band(&cfg, 0.85), (TrustStatus::Healthy, "Highly Reliable"));
        assert_eq!(band(&cfg, 0.8499), (TrustStatus::Healthy, "Reliable"));
        assert_eq!(band(&cfg, 0.78), (TrustStatus::Healthy, "Reliable"));
        assert_eq!(band(&cfg, 0.7799), (TrustStatus::Warning, "Uncertain"));
        assert_eq!(band(&cfg, 0.73), (TrustStatus::Warning, "Uncertain"));
        assert_eq!(band(&cfg, 0.7299), (TrustStatus::Anomalous, "Unreliable"));
        assert_eq!(band(&cfg, 0.50), (TrustStatus::Anomalous, "Unreliable"));
        assert_eq!(band(&cfg, 0.4999), (TrustStatus::Anomalous, "Anomaly"));
        assert_eq!(band(&cfg, 0.0), (TrustStatus::Anomalous, "Anomaly"));
    }

    #[test]
    fn degrading_history_predicts_failure() {
        // ---
        let cfg = ScoringConfig::default();
        let now = Utc::now();

        // Ten verdicts decaying 0.9 → 0.5 (chronological), newest first in
        // the context.
        let mut recent = Vec::new();
        for i in 0..10 {
            let mut v = TrustResult::baseline(now);
            v.score = 0.5 + (i as f64) * (0.4 / 9.0);
            recent.push(v);
        }

        let mut ctx = ctx_with_history(reading(11, 30.0, 22.0, 1.2, 6.5), steady_history(10));
        ctx.recent_trust = recent;
        let verdict = evaluate(&cfg, &ctx, now).unwrap();

        assert_eq!(verdict.health_trend, HealthTrend::Degrading);
        assert!(verdict.trend_slope < -0.03);
        assert!(verdict.failure_prediction.is_some());
        // The current reading itself is clean; the prediction rides on the
        // trend alone.
        assert_eq!(verdict.status, TrustStatus::Healthy);
    }
}

//! Health trend over the sensor's recent verdicts.

use crate::models::{HealthTrend, TrustResult, TrustStatus};
use crate::scorer::regression_slope;

// ---

/// Trend calls need at least this many verdicts behind them.
const MIN_RESULTS_FOR_TREND: usize = 3;

/// Slopes within ±this are read as stable.
const STABLE_SLOPE_BAND: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
pub(crate) struct TrendAssessment {
    pub trend: HealthTrend,
    pub slope: f64,
    pub anomaly_rate: f64,
}

/// Assess the direction of the sensor's trust over its last verdicts
/// (newest first, as sampled by the store).
pub(crate) fn assess(recent: &[TrustResult]) -> TrendAssessment {
    // ---
    let anomaly_rate = if recent.is_empty() {
        0.0
    } else {
        recent
            .iter()
            .filter(|t| t.status == TrustStatus::Anomalous)
            .count() as f64
            / recent.len() as f64
    };

    if recent.len() < MIN_RESULTS_FOR_TREND {
        return TrendAssessment {
            trend: HealthTrend::Unknown,
            slope: 0.0,
            anomaly_rate,
        };
    }

    let chronological: Vec<f64> = recent.iter().rev().map(|t| t.score).collect();
    let slope = regression_slope(&chronological);

    let trend = if slope > STABLE_SLOPE_BAND {
        HealthTrend::Improving
    } else if slope < -STABLE_SLOPE_BAND {
        HealthTrend::Degrading
    } else {
        HealthTrend::Stable
    };

    TrendAssessment {
        trend,
        slope,
        anomaly_rate,
    }
}

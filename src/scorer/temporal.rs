//! Temporal axis: a probe against its own recent history.
//!
//! Checks run in order of how definite they are: a stuck probe (range below
//! the noise floor) beats everything, then the drift regression on the wide
//! window, then the percentage-change bands against the recent mean.

use crate::config::ScoringConfig;
use crate::models::{Parameter, Reading, RootCause};
use crate::scorer::{regression_slope, AxisScore};

// ---

/// Score one probe against the sensor's own prior readings (newest first).
pub(crate) fn assess(
    cfg: &ScoringConfig,
    p: Parameter,
    current: &Reading,
    history: &[Reading],
) -> AxisScore {
    // ---
    let Some(v) = current.value(p) else {
        return AxisScore::clean();
    };

    // Prior values of this probe, newest first.
    let window: Vec<f64> = history
        .iter()
        .filter_map(|r| r.value(p))
        .take(cfg.history_window)
        .collect();

    if window.len() < 2 {
        return AxisScore::clean();
    }

    let max = window.iter().copied().fold(f64::MIN, f64::max);
    let min = window.iter().copied().fold(f64::MAX, f64::min);
    let range = max - min;
    if range < *cfg.static_thresholds.get(p) {
        return AxisScore {
            score: 0.2,
            cause: RootCause::Static,
            flag: Some(format!(
                "{} stuck near {:.2} across its recent readings",
                p.name(),
                v
            )),
        };
    }

    // Drift runs on the wider window and in chronological order, so the
    // slope sign matches elapsed time.
    let drift_values: Vec<f64> = history
        .iter()
        .filter_map(|r| r.value(p))
        .take(cfg.drift_window)
        .collect();
    if drift_values.len() >= 5 {
        let chronological: Vec<f64> = drift_values.iter().rev().copied().collect();
        let slope = regression_slope(&chronological);
        if slope.abs() > *cfg.drift_thresholds.get(p) {
            return AxisScore {
                score: 0.4,
                cause: RootCause::Drift,
                flag: Some(format!(
                    "{} drifting at {:+.2} per reading",
                    p.name(),
                    slope
                )),
            };
        }
    }

    let mean = window.iter().sum::<f64>() / window.len() as f64;
    if mean == 0.0 {
        return AxisScore::clean();
    }
    let change_pct = (v - mean).abs() / mean.abs() * 100.0;

    let bands = cfg.temporal_thresholds.get(p);
    if change_pct <= bands.normal {
        AxisScore::clean()
    } else if change_pct <= bands.moderate {
        AxisScore {
            score: 0.6,
            cause: RootCause::Spike,
            flag: Some(format!(
                "{} moved {:.1}% against its recent mean",
                p.name(),
                change_pct
            )),
        }
    } else {
        AxisScore {
            score: 0.1,
            cause: RootCause::Spike,
            flag: Some(format!(
                "{} spiked {:.1}% against its recent mean",
                p.name(),
                change_pct
            )),
        }
    }
}

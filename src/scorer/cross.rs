//! Cross-zone axis: a probe against the latest values of the other sensors
//! in the same zone.
//!
//! An extreme deviation alone does not prove the sensor is broken: rain or
//! an irrigation cycle moves every probe in the field at once. The
//! tie-breaker replays each neighbour's own recent change: if the
//! neighbours moved too, the reading is a field event, not a fault.

use crate::config::ScoringConfig;
use crate::models::{Parameter, Reading, RootCause};
use crate::scorer::{AxisScore, PeerContext};

// ---

/// Score one probe against its zone peers.
pub(crate) fn assess(
    cfg: &ScoringConfig,
    p: Parameter,
    current: &Reading,
    peers: &[PeerContext],
) -> AxisScore {
    // ---
    let Some(v) = current.value(p) else {
        return AxisScore::clean();
    };

    let peer_values: Vec<f64> = peers
        .iter()
        .filter_map(|peer| peer.latest.as_ref().and_then(|r| r.value(p)))
        .collect();
    if peer_values.is_empty() {
        return AxisScore::clean();
    }

    let zone_mean = peer_values.iter().sum::<f64>() / peer_values.len() as f64;
    if zone_mean == 0.0 {
        return AxisScore::clean();
    }
    let dev_pct = (v - zone_mean).abs() / zone_mean.abs() * 100.0;

    let bands = cfg.cross_thresholds.get(p);
    if dev_pct <= bands.normal {
        return AxisScore::clean();
    }
    if dev_pct <= bands.moderate {
        return AxisScore {
            score: 0.6,
            cause: RootCause::ZoneMismatch,
            flag: Some(format!(
                "{} sits {:.1}% off the zone average",
                p.name(),
                dev_pct
            )),
        };
    }

    // Extreme deviation: fault or field event? Replay each neighbour's own
    // change against its prior window and average.
    if mean_peer_change(cfg, p, peers) > bands.normal {
        AxisScore {
            score: 0.5,
            cause: RootCause::FieldEvent,
            flag: Some(format!("zone-wide shift in {}", p.name())),
        }
    } else {
        AxisScore {
            score: 0.1,
            cause: RootCause::ZoneMismatch,
            flag: Some(format!(
                "{} is {:.1}% from the zone average while neighbours held steady",
                p.name(),
                dev_pct
            )),
        }
    }
}

/// Mean of each peer's own percentage change: latest value against the mean
/// of its prior window. Peers without enough data contribute nothing.
fn mean_peer_change(cfg: &ScoringConfig, p: Parameter, peers: &[PeerContext]) -> f64 {
    // ---
    let mut changes = Vec::new();
    for peer in peers {
        let Some(latest) = peer.latest.as_ref().and_then(|r| r.value(p)) else {
            continue;
        };
        let window: Vec<f64> = peer
            .history
            .iter()
            .filter_map(|r| r.value(p))
            .take(cfg.history_window)
            .collect();
        if window.is_empty() {
            continue;
        }
        let mean = window.iter().sum::<f64>() / window.len() as f64;
        if mean == 0.0 {
            continue;
        }
        changes.push((latest - mean).abs() / mean.abs() * 100.0);
    }
    if changes.is_empty() {
        return 0.0;
    }
    changes.iter().sum::<f64>() / changes.len() as f64
}

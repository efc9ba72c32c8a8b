//! Physical-plausibility axis, computed once per reading and shared by all
//! four probes.
//!
//! Hard bounds come first: a value outside what the soil can physically do
//! ends the assessment at 0.1. Otherwise the score starts at 1.0 and loses
//! a penalty per agronomic inconsistency, floored at 0.1.

use crate::config::ScoringConfig;
use crate::models::{Parameter, Reading, RootCause};

// ---

/// Saturated soil reads above this moisture; without rain or irrigation
/// that is a wiring or calibration fault.
const SATURATION_MOISTURE_PCT: f64 = 85.0;

/// Soil buffers air temperature; a gap beyond this cannot be real.
const SOIL_AIR_GAP_LIMIT_C: f64 = 10.0;

/// Soil pH cannot move this far between consecutive readings.
const PH_JUMP_LIMIT: f64 = 1.5;

/// Nor can conductivity change by more than this fraction, in percent.
const EC_CHANGE_LIMIT_PCT: f64 = 25.0;

/// Floor for the physical score once penalties apply.
const SCORE_FLOOR: f64 = 0.1;

// ---

/// Outcome of the shared physical assessment.
#[derive(Debug, Clone)]
pub(crate) struct PhysicalAssessment {
    pub score: f64,
    pub causes: Vec<RootCause>,
    pub flags: Vec<String>,
}

/// Assess the current reading, with the immediately preceding reading (if
/// any) supplying the jump baselines for pH and EC.
pub(crate) fn assess(
    cfg: &ScoringConfig,
    current: &Reading,
    previous: Option<&Reading>,
) -> PhysicalAssessment {
    // ---
    let mut out_of_range = Vec::new();
    for p in Parameter::ALL {
        if let Some(v) = current.value(p) {
            let limits = cfg.physical_limits.get(p);
            if v < limits.min || v > limits.max {
                out_of_range.push(format!(
                    "{} {:.2} outside the plausible range {}..{}",
                    p.name(),
                    v,
                    limits.min,
                    limits.max
                ));
            }
        }
    }
    if !out_of_range.is_empty() {
        return PhysicalAssessment {
            score: SCORE_FLOOR,
            causes: vec![RootCause::ImpossibleValue],
            flags: out_of_range,
        };
    }

    let mut score = 1.0;
    let mut causes = Vec::new();
    let mut flags = Vec::new();
    let penalties = &cfg.physical_penalties;

    if let Some(moisture) = current.moisture {
        let raining = current.is_raining.unwrap_or(false);
        let irrigating = current.irrigation_active.unwrap_or(false);
        if moisture > SATURATION_MOISTURE_PCT && !raining && !irrigating {
            score -= penalties.high_moisture_no_rain;
            causes.push(RootCause::WeatherMismatch);
            flags.push(format!(
                "moisture {moisture:.1}% with neither rain nor irrigation"
            ));
        }
    }

    if let (Some(soil), Some(air)) = (current.temperature, current.air_temp) {
        if (soil - air).abs() > SOIL_AIR_GAP_LIMIT_C {
            score -= penalties.soil_air_temp_gap;
            causes.push(RootCause::WeatherMismatch);
            flags.push(format!(
                "soil temperature {soil:.1}°C is {:.1}°C away from air",
                (soil - air).abs()
            ));
        }
    }

    if let Some(prev) = previous {
        if let (Some(ph), Some(prev_ph)) = (current.ph, prev.ph) {
            if (ph - prev_ph).abs() > PH_JUMP_LIMIT {
                score -= penalties.ph_jump;
                causes.push(RootCause::Spike);
                flags.push(format!(
                    "ph jumped {:.2} since the previous reading",
                    (ph - prev_ph).abs()
                ));
            }
        }
        if let (Some(ec), Some(prev_ec)) = (current.ec, prev.ec) {
            if prev_ec != 0.0 {
                let change_pct = (ec - prev_ec).abs() / prev_ec.abs() * 100.0;
                if change_pct > EC_CHANGE_LIMIT_PCT {
                    score -= penalties.ec_spike;
                    causes.push(RootCause::Spike);
                    flags.push(format!(
                        "ec changed {change_pct:.1}% since the previous reading"
                    ));
                }
            }
        }
    }

    PhysicalAssessment {
        score: score.max(SCORE_FLOOR),
        causes,
        flags,
    }
}

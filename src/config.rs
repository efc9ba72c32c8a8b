//! Configuration for the probos backend.
//!
//! Two layers live here, both immutable after startup:
//! - [`Config`]: runtime values loaded from environment variables (with
//!   optional `.env` support provided by the caller). Consolidating the
//!   `env::var` calls in one place keeps the rest of the codebase free of
//!   environment lookups.
//! - [`ScoringConfig`]: the thresholds, weights and windows the scorer
//!   runs with. Defaults match the deployed calibration; a JSON file can
//!   override them wholesale via `SCORING_CONFIG`.

use std::env;
use std::fs;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::models::Parameter;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_num {
    ($var_name:expr, $default:expr, $ty:ty) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Strongly typed runtime configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// SQLite connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// TCP port the API listens on.
    pub port: u16,

    /// Capacity of each subscriber's event buffer. A subscriber that falls
    /// further behind than this loses its oldest events.
    pub event_buffer: usize,

    /// Minimum milliseconds between `dashboard.update` emissions. Zero
    /// disables coalescing and emits on every aggregate change.
    pub dashboard_tick_ms: u64,

    /// Optional path to a JSON scoring-configuration override.
    pub scoring_file: Option<String>,
}

/// Load runtime configuration from environment variables with defaults.
///
/// Optional:
/// - `DATABASE_URL` – SQLite connection string (default: `sqlite://probos.db?mode=rwc`)
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `PORT` – listen port (default: 8080)
/// - `EVENT_BUFFER` – per-subscriber event buffer (default: 256)
/// - `DASHBOARD_TICK_MS` – dashboard coalescing interval (default: 1000)
/// - `SCORING_CONFIG` – path to a scoring-config JSON file
///
/// Returns an error if any variable is present but unparsable.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://probos.db?mode=rwc".to_string());
    let db_pool_max = parse_env_num!("DB_POOL_MAX", 5, u32);
    let port = parse_env_num!("PORT", 8080, u16);
    let event_buffer = parse_env_num!("EVENT_BUFFER", 256, usize);
    let dashboard_tick_ms = parse_env_num!("DASHBOARD_TICK_MS", 1000, u64);
    let scoring_file = env::var("SCORING_CONFIG").ok();

    Ok(Config {
        db_url,
        db_pool_max,
        port,
        event_buffer,
        dashboard_tick_ms,
        scoring_file,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks credentials in the database URL while showing all values that
    /// were loaded.
    pub fn log_config(&self) {
        // ---
        let masked_db_url = if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                )
            } else {
                self.db_url.clone()
            }
        } else {
            self.db_url.clone()
        };

        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL      : {}", masked_db_url);
        tracing::info!("  DB_POOL_MAX       : {}", self.db_pool_max);
        tracing::info!("  PORT              : {}", self.port);
        tracing::info!("  EVENT_BUFFER      : {}", self.event_buffer);
        tracing::info!("  DASHBOARD_TICK_MS : {}", self.dashboard_tick_ms);
        tracing::info!(
            "  SCORING_CONFIG    : {}",
            self.scoring_file.as_deref().unwrap_or("(built-in defaults)")
        );
    }
}

// ---

/// One value per probe.
#[derive(Debug, Clone, Deserialize)]
pub struct PerProbe<T> {
    pub moisture: T,
    pub temperature: T,
    pub ec: T,
    pub ph: T,
}

impl<T> PerProbe<T> {
    pub fn get(&self, p: Parameter) -> &T {
        match p {
            Parameter::Moisture => &self.moisture,
            Parameter::Temperature => &self.temperature,
            Parameter::Ec => &self.ec,
            Parameter::Ph => &self.ph,
        }
    }
}

/// Axis weights for the per-parameter aggregate. Must sum to 1.
#[derive(Debug, Clone, Deserialize)]
pub struct Weights {
    pub temporal: f64,
    pub cross: f64,
    pub physical: f64,
}

/// Hard plausibility bounds for a probe, both ends inclusive.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Limits {
    pub min: f64,
    pub max: f64,
}

/// Percentage-change bands: deviations up to `normal` are fine, up to
/// `moderate` are suspicious, beyond that extreme.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChangeBands {
    pub normal: f64,
    pub moderate: f64,
}

/// Score deductions applied by the physical-plausibility checks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalPenalties {
    pub high_moisture_no_rain: f64,
    pub soil_air_temp_gap: f64,
    pub ph_jump: f64,
    pub ec_spike: f64,
}

/// Aggregate-score cut-offs, strictly descending. Scores at or above a
/// bound take that band.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustBands {
    pub highly_reliable: f64,
    pub reliable: f64,
    pub uncertain: f64,
    pub unreliable: f64,
}

/// The scorer's complete calibration. Loaded once at startup and shared by
/// reference; nothing mutates it afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    pub weights: Weights,

    pub physical_limits: PerProbe<Limits>,

    /// Temporal change bands, percent against the sensor's own recent mean.
    pub temporal_thresholds: PerProbe<ChangeBands>,

    /// A probe whose recent range stays below this is considered stuck.
    pub static_thresholds: PerProbe<f64>,

    /// Regression slope (units per reading) above which a probe is
    /// considered to be drifting.
    pub drift_thresholds: PerProbe<f64>,

    /// Cross-zone deviation bands, percent against the peer mean.
    pub cross_thresholds: PerProbe<ChangeBands>,

    pub physical_penalties: PhysicalPenalties,

    pub trust_bands: TrustBands,

    /// Readings considered by the temporal change and static checks.
    pub history_window: usize,

    /// Wider window the drift regression runs on.
    pub drift_window: usize,

    /// Verdicts considered by the health-trend regression.
    pub trend_window: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: Weights {
                temporal: 0.3,
                cross: 0.5,
                physical: 0.2,
            },
            physical_limits: PerProbe {
                moisture: Limits { min: 0.0, max: 100.0 },
                temperature: Limits { min: 0.0, max: 60.0 },
                ec: Limits { min: 0.0, max: 10.0 },
                ph: Limits { min: 3.0, max: 10.0 },
            },
            temporal_thresholds: PerProbe {
                moisture: ChangeBands { normal: 25.0, moderate: 60.0 },
                temperature: ChangeBands { normal: 15.0, moderate: 40.0 },
                ec: ChangeBands { normal: 20.0, moderate: 50.0 },
                ph: ChangeBands { normal: 10.0, moderate: 25.0 },
            },
            // Below the noise floor of a live probe: a healthy moisture
            // channel wanders at least ±1 %VWC over ten readings.
            static_thresholds: PerProbe {
                moisture: 0.5,
                temperature: 0.3,
                ec: 0.02,
                ph: 0.02,
            },
            // Diurnal temperature swing reaches ~0.4 °C/h, so its bound sits
            // above that; the others clear seasonal variation.
            drift_thresholds: PerProbe {
                moisture: 0.5,
                temperature: 0.8,
                ec: 0.05,
                ph: 0.05,
            },
            cross_thresholds: PerProbe {
                moisture: ChangeBands { normal: 25.0, moderate: 50.0 },
                temperature: ChangeBands { normal: 20.0, moderate: 40.0 },
                ec: ChangeBands { normal: 25.0, moderate: 50.0 },
                ph: ChangeBands { normal: 10.0, moderate: 20.0 },
            },
            physical_penalties: PhysicalPenalties {
                high_moisture_no_rain: 0.4,
                soil_air_temp_gap: 0.3,
                ph_jump: 0.3,
                ec_spike: 0.3,
            },
            trust_bands: TrustBands {
                highly_reliable: 0.85,
                reliable: 0.78,
                uncertain: 0.73,
                unreliable: 0.50,
            },
            history_window: 10,
            drift_window: 20,
            trend_window: 10,
        }
    }
}

impl ScoringConfig {
    /// Load the scoring configuration: built-in defaults, or the JSON file
    /// at `path` when given. The result is validated either way.
    pub fn load(path: Option<&str>) -> Result<Self> {
        // ---
        let cfg = match path {
            Some(p) => {
                let raw = fs::read_to_string(p)
                    .with_context(|| format!("reading scoring config {p}"))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing scoring config {p}"))?
            }
            None => Self::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the scorer cannot run with.
    pub fn validate(&self) -> Result<()> {
        // ---
        let sum = self.weights.temporal + self.weights.cross + self.weights.physical;
        if (sum - 1.0).abs() > 1e-9 {
            bail!("axis weights must sum to 1, got {sum}");
        }

        let b = &self.trust_bands;
        if !(b.highly_reliable > b.reliable
            && b.reliable > b.uncertain
            && b.uncertain > b.unreliable)
        {
            bail!("trust bands must be strictly descending");
        }

        for p in Parameter::ALL {
            let lim = self.physical_limits.get(p);
            if lim.min >= lim.max {
                bail!("physical limits for {} are inverted", p.name());
            }
            for bands in [self.temporal_thresholds.get(p), self.cross_thresholds.get(p)] {
                if bands.normal >= bands.moderate {
                    bail!("change bands for {} must have normal < moderate", p.name());
                }
            }
            if *self.static_thresholds.get(p) <= 0.0 || *self.drift_thresholds.get(p) <= 0.0 {
                bail!("static/drift thresholds for {} must be positive", p.name());
            }
        }

        if self.history_window == 0 || self.trend_window == 0 {
            bail!("analysis windows must be at least 1");
        }
        if self.drift_window < self.history_window {
            bail!("drift window must be at least as wide as the history window");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn defaults_validate() {
        // ---
        ScoringConfig::default().validate().unwrap();
    }

    #[test]
    fn bad_weights_rejected() {
        // ---
        let mut cfg = ScoringConfig::default();
        cfg.weights.cross = 0.6;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bands_must_descend() {
        // ---
        let mut cfg = ScoringConfig::default();
        cfg.trust_bands.uncertain = cfg.trust_bands.reliable;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_override_falls_back_to_defaults() {
        // ---
        let cfg: ScoringConfig =
            serde_json::from_str(r#"{"historyWindow": 8}"#).unwrap();
        assert_eq!(cfg.history_window, 8);
        assert_eq!(cfg.drift_window, 20);
        assert_eq!(cfg.weights.cross, 0.5);
        cfg.validate().unwrap();
    }

    #[test]
    fn inverted_limits_rejected() {
        // ---
        let mut cfg = ScoringConfig::default();
        cfg.physical_limits.ph = Limits { min: 10.0, max: 3.0 };
        assert!(cfg.validate().is_err());
    }
}

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid value {value:?} ({expected})")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Process configuration, read from `QUADRA_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Facility-local time of the daily reservation purge.
    pub reservation_sweep_at: NaiveTime,
    /// Facility-local time of the daily tournament finalize.
    pub tournament_sweep_at: NaiveTime,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub seed_tournament_date: Option<NaiveDate>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            reservation_sweep_at: NaiveTime::from_hms_opt(3, 0, 0).unwrap_or(NaiveTime::MIN),
            tournament_sweep_at: NaiveTime::MIN,
            compact_threshold: 1000,
            metrics_port: None,
            seed_tournament_date: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Unset or empty variables take the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            data_dir: get("QUADRA_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            reservation_sweep_at: match get("QUADRA_RESERVATION_SWEEP_AT") {
                Some(v) => parse_time("QUADRA_RESERVATION_SWEEP_AT", v)?,
                None => defaults.reservation_sweep_at,
            },
            tournament_sweep_at: match get("QUADRA_TOURNAMENT_SWEEP_AT") {
                Some(v) => parse_time("QUADRA_TOURNAMENT_SWEEP_AT", v)?,
                None => defaults.tournament_sweep_at,
            },
            compact_threshold: match get("QUADRA_COMPACT_THRESHOLD") {
                Some(v) => v.trim().parse().map_err(|_| invalid("QUADRA_COMPACT_THRESHOLD", v, "unsigned integer"))?,
                None => defaults.compact_threshold,
            },
            metrics_port: get("QUADRA_METRICS_PORT")
                .map(|v| v.trim().parse().map_err(|_| invalid("QUADRA_METRICS_PORT", v, "port number")))
                .transpose()?,
            seed_tournament_date: get("QUADRA_SEED_TOURNAMENT_DATE")
                .map(|v| {
                    NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                        .map_err(|_| invalid("QUADRA_SEED_TOURNAMENT_DATE", v, "YYYY-MM-DD"))
                })
                .transpose()?,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("quadra.wal")
    }
}

fn parse_time(var: &'static str, value: String) -> Result<NaiveTime, ConfigError> {
    let v = value.trim();
    NaiveTime::parse_from_str(v, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(v, "%H:%M:%S"))
        .map_err(|_| invalid(var, value, "HH:MM"))
}

fn invalid(var: &'static str, value: String, expected: &'static str) -> ConfigError {
    ConfigError::Invalid { var, value, expected }
}

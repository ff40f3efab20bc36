//! Run configuration.
//!
//! Deserialized from TOML (and overridable from CLI flags); validated before
//! the loop starts. Bad configuration never reaches the engine — it exits
//! with `ConfigError` up front.

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("initial_capital must be > 0, got {0}")]
    NonPositiveCapital(f64),

    #[error("tickers list is empty")]
    NoTickers,

    #[error("start_date {0} is after end_date {1}")]
    InvertedDateRange(NaiveDate, NaiveDate),

    #[error("margin_requirement must be in 0..=1, got {0}")]
    BadMargin(f64),

    #[error("{name} must be ≥ 0, got {value}")]
    NegativeValue { name: &'static str, value: f64 },

    #[error("trading_window_start {0} is not before trading_window_end {1}")]
    InvertedWindow(NaiveTime, NaiveTime),

    #[error("{name} must be > 0")]
    ZeroInterval { name: &'static str },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

fn default_margin() -> f64 {
    0.5
}
fn default_opening_range_minutes() -> u32 {
    15
}
fn default_risk_per_trade_pct() -> f64 {
    0.0025
}
fn default_time_invalidation_bars() -> u32 {
    5
}
fn default_time_invalidation_mfe_r() -> f64 {
    0.5
}
fn default_seed() -> u64 {
    42
}
fn default_timezone() -> Tz {
    chrono_tz::America::New_York
}
fn default_window_start() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 30, 0).unwrap()
}
fn default_window_end() -> NaiveTime {
    NaiveTime::from_hms_opt(16, 0, 0).unwrap()
}

/// Everything a run needs. One value of this type fully determines a run's
/// outputs (together with the dataset) — it is echoed into `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub tickers: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    #[serde(default = "default_margin")]
    pub margin_requirement: f64,
    #[serde(default)]
    pub commission_per_trade: f64,
    #[serde(default)]
    pub slippage_bps: f64,
    #[serde(default)]
    pub spread_bps: f64,

    #[serde(default = "default_window_start")]
    pub trading_window_start: NaiveTime,
    #[serde(default = "default_window_end")]
    pub trading_window_end: NaiveTime,

    #[serde(default = "default_opening_range_minutes")]
    pub opening_range_minutes: u32,
    #[serde(default = "default_risk_per_trade_pct")]
    pub risk_per_trade_pct: f64,
    #[serde(default = "default_time_invalidation_bars")]
    pub time_invalidation_bars: u32,
    #[serde(default = "default_time_invalidation_mfe_r")]
    pub time_invalidation_mfe_r: f64,

    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Hash of a previous identical run; a mismatch fails the run with a
    /// determinism violation.
    #[serde(default)]
    pub expected_hash: Option<String>,

    /// Set via `ENGINE_DETERMINISTIC=1`: forbid wall-clock or network access
    /// during the run.
    #[serde(default)]
    pub strict_determinism: bool,
}

impl EngineConfig {
    /// Fraction applied to strategy-initiated fills:
    /// `(slippage_bps + spread_bps) / 10_000`.
    pub fn friction(&self) -> f64 {
        (self.slippage_bps + self.spread_bps) / 10_000.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        if self.tickers.is_empty() {
            return Err(ConfigError::NoTickers);
        }
        if self.start_date > self.end_date {
            return Err(ConfigError::InvertedDateRange(self.start_date, self.end_date));
        }
        if !(0.0..=1.0).contains(&self.margin_requirement) {
            return Err(ConfigError::BadMargin(self.margin_requirement));
        }
        for (name, value) in [
            ("commission_per_trade", self.commission_per_trade),
            ("slippage_bps", self.slippage_bps),
            ("spread_bps", self.spread_bps),
            ("risk_per_trade_pct", self.risk_per_trade_pct),
            ("time_invalidation_mfe_r", self.time_invalidation_mfe_r),
        ] {
            if value < 0.0 {
                return Err(ConfigError::NegativeValue { name, value });
            }
        }
        if self.trading_window_start >= self.trading_window_end {
            return Err(ConfigError::InvertedWindow(
                self.trading_window_start,
                self.trading_window_end,
            ));
        }
        if self.opening_range_minutes == 0 {
            return Err(ConfigError::ZeroInterval {
                name: "opening_range_minutes",
            });
        }
        if self.time_invalidation_bars == 0 {
            return Err(ConfigError::ZeroInterval {
                name: "time_invalidation_bars",
            });
        }
        Ok(())
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Content hash of the configuration, for the run fingerprint.
    pub fn config_hash(&self) -> String {
        let json = serde_json::to_string(self).expect("EngineConfig must serialize");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_config() -> EngineConfig {
        EngineConfig {
            initial_capital: 100_000.0,
            tickers: vec!["ES".into()],
            start_date: NaiveDate::from_ymd_opt(2025, 9, 22).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 9, 26).unwrap(),
            margin_requirement: 0.5,
            commission_per_trade: 2.0,
            slippage_bps: 5.0,
            spread_bps: 2.0,
            trading_window_start: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            trading_window_end: NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
            opening_range_minutes: 15,
            risk_per_trade_pct: 0.0025,
            time_invalidation_bars: 5,
            time_invalidation_mfe_r: 0.5,
            timezone: chrono_tz::America::New_York,
            snapshot_dir: None,
            seed: 42,
            expected_hash: None,
            strict_determinism: false,
        }
    }

    #[test]
    fn sample_validates() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn friction_combines_slippage_and_spread() {
        let cfg = sample_config();
        assert!((cfg.friction() - 7e-4).abs() < 1e-15);
    }

    #[test]
    fn rejects_zero_capital() {
        let mut cfg = sample_config();
        cfg.initial_capital = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositiveCapital(_))
        ));
    }

    #[test]
    fn rejects_empty_tickers() {
        let mut cfg = sample_config();
        cfg.tickers.clear();
        assert!(matches!(cfg.validate(), Err(ConfigError::NoTickers)));
    }

    #[test]
    fn rejects_inverted_dates() {
        let mut cfg = sample_config();
        cfg.end_date = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvertedDateRange(_, _))
        ));
    }

    #[test]
    fn rejects_inverted_window() {
        let mut cfg = sample_config();
        cfg.trading_window_end = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvertedWindow(_, _))
        ));
    }

    #[test]
    fn parses_minimal_toml_with_defaults() {
        let cfg = EngineConfig::from_toml(
            r#"
            initial_capital = 100000.0
            tickers = ["ES"]
            start_date = "2025-09-22"
            end_date = "2025-09-26"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.margin_requirement, 0.5);
        assert_eq!(cfg.opening_range_minutes, 15);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.timezone, chrono_tz::America::New_York);
    }

    #[test]
    fn config_hash_is_stable() {
        let cfg = sample_config();
        assert_eq!(cfg.config_hash(), cfg.config_hash());
        let mut other = sample_config();
        other.seed = 43;
        assert_ne!(cfg.config_hash(), other.config_hash());
    }
}

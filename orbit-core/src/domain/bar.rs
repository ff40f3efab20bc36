//! Bar — the fundamental market data unit.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single ticker at one instant.
///
/// `timestamp` is the wall-clock instant in the dataset's timezone; all bars
/// of one dataset share that timezone. Intraday datasets carry a time
/// component, daily datasets land on midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub ticker: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    /// Calendar date of this bar (one session = one date).
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// OHLC sanity: `low ≤ min(open, close) ≤ max(open, close) ≤ high`, `low > 0`.
    pub fn is_sane(&self) -> bool {
        if self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan() {
            return false;
        }
        self.low > 0.0
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high
    }

    /// Reason the bar fails `is_sane`, for diagnostics.
    pub fn sanity_violation(&self) -> Option<String> {
        if self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan() {
            return Some("NaN in OHLC".into());
        }
        if self.low <= 0.0 {
            return Some(format!("non-positive low {}", self.low));
        }
        if self.low > self.open.min(self.close) || self.open.max(self.close) > self.high {
            return Some(format!(
                "OHLC out of order: o={} h={} l={} c={}",
                self.open, self.high, self.low, self.close
            ));
        }
        None
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Candle body direction: positive close > open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }
}

//! Dataset — validated, ordered bar series for a set of tickers.

use crate::domain::Bar;
use crate::error::DataIntegrityError;
use chrono::{NaiveDate, Timelike};
use chrono_tz::Tz;
use std::collections::BTreeMap;

/// Position of a bar in the global replay order: which ticker's series and
/// the index within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarRef {
    pub ticker: String,
    pub index: usize,
}

/// All bars of a run, validated once at construction.
///
/// Per-ticker series are strictly increasing in timestamp; the global replay
/// order interleaves tickers by `(timestamp, ticker)`. The dataset is
/// immutable after construction — restartable iteration is just re-walking
/// `order`.
#[derive(Debug, Clone)]
pub struct Dataset {
    tz: Tz,
    series: BTreeMap<String, Vec<Bar>>,
    order: Vec<BarRef>,
    hash: String,
    intraday: bool,
}

impl Dataset {
    /// Validate and index a set of per-ticker series (each must already be
    /// sorted ascending — the loader sorts before calling).
    pub fn new(series: BTreeMap<String, Vec<Bar>>, tz: Tz) -> Result<Self, DataIntegrityError> {
        for (ticker, bars) in &series {
            let mut prev: Option<&Bar> = None;
            for bar in bars {
                if let Some(detail) = bar.sanity_violation() {
                    return Err(DataIntegrityError::BadBar {
                        ticker: ticker.clone(),
                        timestamp: bar.timestamp,
                        detail,
                    });
                }
                if let Some(p) = prev {
                    if bar.timestamp <= p.timestamp {
                        return Err(DataIntegrityError::DuplicateBar {
                            ticker: ticker.clone(),
                            timestamp: bar.timestamp,
                        });
                    }
                }
                prev = Some(bar);
            }
        }

        Ok(Self::build(series, tz))
    }

    /// Skip validation — for exercising the engine's own guards against
    /// data the loader would have rejected.
    #[cfg(test)]
    pub(crate) fn new_unchecked(series: BTreeMap<String, Vec<Bar>>, tz: Tz) -> Self {
        Self::build(series, tz)
    }

    fn build(series: BTreeMap<String, Vec<Bar>>, tz: Tz) -> Self {
        let mut order: Vec<BarRef> = series
            .iter()
            .flat_map(|(ticker, bars)| {
                (0..bars.len()).map(move |index| BarRef {
                    ticker: ticker.clone(),
                    index,
                })
            })
            .collect();
        order.sort_by(|a, b| {
            let ta = series[&a.ticker][a.index].timestamp;
            let tb = series[&b.ticker][b.index].timestamp;
            ta.cmp(&tb).then_with(|| a.ticker.cmp(&b.ticker))
        });

        let hash = content_hash(&series);
        let intraday = detect_intraday(&series);

        Self {
            tz,
            series,
            order,
            hash,
            intraday,
        }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn bars(&self, ticker: &str) -> &[Bar] {
        self.series.get(ticker).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Global replay order.
    pub fn order(&self) -> &[BarRef] {
        &self.order
    }

    pub fn bar(&self, r: &BarRef) -> &Bar {
        &self.series[&r.ticker][r.index]
    }

    /// Total bar count across all tickers.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// BLAKE3 over the canonical row encoding; identifies the exact inputs
    /// of a run.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// True when the first session carries non-midnight wall-clock times.
    pub fn is_intraday(&self) -> bool {
        self.intraday
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.order.first().map(|r| self.bar(r).date())
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.order.last().map(|r| self.bar(r).date())
    }
}

fn content_hash(series: &BTreeMap<String, Vec<Bar>>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (ticker, bars) in series {
        for bar in bars {
            hasher.update(
                format!(
                    "{ticker},{},{},{},{},{},{}\n",
                    bar.timestamp, bar.open, bar.high, bar.low, bar.close, bar.volume
                )
                .as_bytes(),
            );
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn detect_intraday(series: &BTreeMap<String, Vec<Bar>>) -> bool {
    let first_date = series
        .values()
        .filter_map(|bars| bars.first())
        .map(|b| b.date())
        .min();
    let Some(first_date) = first_date else {
        return false;
    };
    series.values().any(|bars| {
        bars.iter()
            .take_while(|b| b.date() == first_date)
            .any(|b| b.timestamp.time().num_seconds_from_midnight() != 0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(ticker: &str, day: u32, h: u32, m: u32, close: f64) -> Bar {
        Bar {
            ticker: ticker.into(),
            timestamp: NaiveDate::from_ymd_opt(2025, 9, day)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000,
        }
    }

    fn single_series(bars: Vec<Bar>) -> BTreeMap<String, Vec<Bar>> {
        let mut m = BTreeMap::new();
        m.insert("ES".to_string(), bars);
        m
    }

    #[test]
    fn orders_bars_across_tickers_by_timestamp() {
        let mut series = BTreeMap::new();
        series.insert("ES".to_string(), vec![bar("ES", 22, 9, 30, 100.0), bar("ES", 22, 9, 40, 101.0)]);
        series.insert("NQ".to_string(), vec![bar("NQ", 22, 9, 35, 200.0)]);
        let ds = Dataset::new(series, chrono_tz::America::New_York).unwrap();
        let tickers: Vec<&str> = ds.order().iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["ES", "NQ", "ES"]);
    }

    #[test]
    fn ties_break_by_ticker_name() {
        let mut series = BTreeMap::new();
        series.insert("NQ".to_string(), vec![bar("NQ", 22, 9, 30, 200.0)]);
        series.insert("ES".to_string(), vec![bar("ES", 22, 9, 30, 100.0)]);
        let ds = Dataset::new(series, chrono_tz::America::New_York).unwrap();
        assert_eq!(ds.order()[0].ticker, "ES");
        assert_eq!(ds.order()[1].ticker, "NQ");
    }

    #[test]
    fn rejects_duplicate_timestamps() {
        let bars = vec![bar("ES", 22, 9, 30, 100.0), bar("ES", 22, 9, 30, 101.0)];
        let err = Dataset::new(single_series(bars), chrono_tz::America::New_York).unwrap_err();
        assert!(matches!(err, DataIntegrityError::DuplicateBar { .. }));
    }

    #[test]
    fn rejects_bad_ohlc() {
        let mut b = bar("ES", 22, 9, 30, 100.0);
        b.high = 90.0;
        let err = Dataset::new(single_series(vec![b]), chrono_tz::America::New_York).unwrap_err();
        assert!(matches!(err, DataIntegrityError::BadBar { .. }));
    }

    #[test]
    fn detects_intraday() {
        let ds = Dataset::new(
            single_series(vec![bar("ES", 22, 9, 30, 100.0)]),
            chrono_tz::America::New_York,
        )
        .unwrap();
        assert!(ds.is_intraday());
    }

    #[test]
    fn daily_bars_are_not_intraday() {
        let ds = Dataset::new(
            single_series(vec![bar("ES", 22, 0, 0, 100.0), bar("ES", 23, 0, 0, 101.0)]),
            chrono_tz::America::New_York,
        )
        .unwrap();
        assert!(!ds.is_intraday());
    }

    #[test]
    fn hash_changes_with_content() {
        let a = Dataset::new(
            single_series(vec![bar("ES", 22, 9, 30, 100.0)]),
            chrono_tz::America::New_York,
        )
        .unwrap();
        let b = Dataset::new(
            single_series(vec![bar("ES", 22, 9, 30, 100.5)]),
            chrono_tz::America::New_York,
        )
        .unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn hash_is_stable_across_constructions() {
        let mk = || {
            Dataset::new(
                single_series(vec![bar("ES", 22, 9, 30, 100.0), bar("ES", 22, 9, 35, 101.0)]),
                chrono_tz::America::New_York,
            )
            .unwrap()
        };
        assert_eq!(mk().hash(), mk().hash());
    }
}

//! CSV bar source.
//!
//! One file per ticker (`<TICKER>.csv`) with header
//! `date,open,high,low,close,volume`. Rows are re-sorted ascending; exact
//! duplicate timestamps are rejected rather than deduplicated. Gaps are
//! tolerated and never interpolated — the engine simply advances to the next
//! available bar.

use crate::config::EngineConfig;
use crate::data::dataset::Dataset;
use crate::domain::Bar;
use crate::error::DataIntegrityError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

/// Parse a CSV timestamp. Accepts `YYYY-MM-DD HH:MM:SS`, the `T`-separated
/// variant, `YYYY-MM-DD HH:MM`, and a bare date (treated as midnight-of-date).
/// The timestamp type carries the full resolution end to end — anything that
/// cannot be represented losslessly is rejected here.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Load and validate the configured tickers from a directory of CSV files,
/// filtered to `start_date..=end_date` (calendar dates in the dataset's
/// timezone — for an intraday dataset a date query keeps every bar of that
/// session).
pub fn load_dataset(data_dir: &Path, config: &EngineConfig) -> Result<Dataset, DataIntegrityError> {
    let mut series = BTreeMap::new();
    for ticker in &config.tickers {
        let path = data_dir.join(format!("{ticker}.csv"));
        if !path.exists() {
            return Err(DataIntegrityError::MissingTicker(ticker.clone()));
        }
        let bars = load_ticker_csv(&path, ticker, config.start_date, config.end_date)?;
        if bars.is_empty() {
            return Err(DataIntegrityError::EmptyRange {
                ticker: ticker.clone(),
                start: config.start_date,
                end: config.end_date,
            });
        }
        series.insert(ticker.clone(), bars);
    }
    Dataset::new(series, config.timezone)
}

fn load_ticker_csv(
    path: &Path,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Bar>, DataIntegrityError> {
    let malformed = |detail: String| DataIntegrityError::Malformed {
        path: path.display().to_string(),
        detail,
    };

    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| malformed(format!("cannot open: {e}")))?;

    let mut bars = Vec::new();
    for (line, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|e| malformed(format!("row {}: {e}", line + 2)))?;
        let timestamp = parse_timestamp(&row.date)
            .ok_or_else(|| malformed(format!("row {}: unparseable date '{}'", line + 2, row.date)))?;

        let date = timestamp.date();
        if date < start || date > end {
            continue;
        }

        bars.push(Bar {
            ticker: ticker.to_string(),
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    // Re-sort; Dataset::new rejects any duplicate that survives the sort.
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use std::io::Write;

    #[test]
    fn parses_full_timestamps() {
        let ts = parse_timestamp("2025-09-23 09:35:00").unwrap();
        assert_eq!(ts.to_string(), "2025-09-23 09:35:00");
        assert_eq!(parse_timestamp("2025-09-23T09:35:00"), Some(ts));
        assert_eq!(parse_timestamp("2025-09-23 09:35"), Some(ts));
    }

    #[test]
    fn date_only_becomes_midnight() {
        let ts = parse_timestamp("2025-09-23").unwrap();
        assert_eq!(ts.to_string(), "2025-09-23 00:00:00");
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    fn write_csv(dir: &Path, ticker: &str, rows: &[&str]) {
        let mut f = std::fs::File::create(dir.join(format!("{ticker}.csv"))).unwrap();
        writeln!(f, "date,open,high,low,close,volume").unwrap();
        for row in rows {
            writeln!(f, "{row}").unwrap();
        }
    }

    #[test]
    fn loads_and_sorts_out_of_order_rows() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "ES",
            &[
                "2025-09-23 09:35:00,101,102,100,101.5,900",
                "2025-09-23 09:30:00,100,101,99.5,100.5,1000",
            ],
        );
        let ds = load_dataset(dir.path(), &sample_config()).unwrap();
        let bars = ds.bars("ES");
        assert_eq!(bars.len(), 2);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "ES",
            &[
                "2025-09-23 09:30:00,100,101,99.5,100.5,1000",
                "2025-09-23 09:30:00,100,101,99.5,100.5,1000",
            ],
        );
        let err = load_dataset(dir.path(), &sample_config()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::DuplicateBar { .. }));
    }

    #[test]
    fn missing_ticker_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dataset(dir.path(), &sample_config()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::MissingTicker(_)));
    }

    #[test]
    fn out_of_range_rows_are_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(
            dir.path(),
            "ES",
            &[
                "2025-09-19 09:30:00,100,101,99.5,100.5,1000",
                "2025-09-23 09:30:00,100,101,99.5,100.5,1000",
            ],
        );
        let ds = load_dataset(dir.path(), &sample_config()).unwrap();
        assert_eq!(ds.bars("ES").len(), 1);
    }

    #[test]
    fn empty_range_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "ES", &["2025-01-02 09:30:00,100,101,99.5,100.5,1000"]);
        let err = load_dataset(dir.path(), &sample_config()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::EmptyRange { .. }));
    }

    #[test]
    fn bad_ohlc_row_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_csv(dir.path(), "ES", &["2025-09-23 09:30:00,100,99,99.5,100.5,1000"]);
        let err = load_dataset(dir.path(), &sample_config()).unwrap_err();
        assert!(matches!(err, DataIntegrityError::BadBar { .. }));
    }
}

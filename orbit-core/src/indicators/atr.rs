//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|).
//! ATR uses Wilder smoothing (EMA with alpha = 1/period), seeded with the
//! mean of the first `period` true-range values.

use crate::domain::Bar;

/// True Range series. TR[0] has no previous close and is just high − low.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        let value = if i == 0 {
            bar.high - bar.low
        } else {
            let pc = bars[i - 1].close;
            (bar.high - bar.low)
                .max((bar.high - pc).abs())
                .max((bar.low - pc).abs())
        };
        tr.push(value);
    }
    tr
}

/// Wilder-smoothed ATR series. `None` until `period` true-range values have
/// accumulated (the seed forms at index `period - 1`).
pub fn wilder_atr(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    assert!(period >= 1, "ATR period must be >= 1");
    let tr = true_range(bars);
    let n = tr.len();
    let mut out = vec![None; n];
    if n < period {
        return out;
    }

    let seed: f64 = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(seed);

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in period..n {
        let smoothed = alpha * tr[i] + (1.0 - alpha) * prev;
        out[i] = Some(smoothed);
        prev = smoothed;
    }
    out
}

/// Median of a slice. Empty input yields `None`.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("no NaN in ATR history"));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
        let base = NaiveDate::from_ymd_opt(2025, 9, 22)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        data.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Bar {
                ticker: "ES".into(),
                timestamp: base + chrono::Duration::minutes(5 * i as i64),
                open,
                high,
                low,
                close,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn true_range_basic() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 10
            (102.0, 108.0, 100.0, 106.0), // TR = max(8, 6, 2) = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = max(9, 1, 8) = 9
        ]);
        let tr = true_range(&bars);
        assert_eq!(tr, vec![10.0, 8.0, 9.0]);
    }

    #[test]
    fn true_range_gap_up() {
        let bars = make_ohlc_bars(&[
            (98.0, 102.0, 97.0, 100.0),
            (110.0, 115.0, 108.0, 112.0), // TR = max(7, 15, 8) = 15
        ]);
        assert_eq!(true_range(&bars)[1], 15.0);
    }

    #[test]
    fn atr_seed_and_smoothing() {
        let bars = make_ohlc_bars(&[
            (100.0, 105.0, 95.0, 102.0),  // TR = 10
            (102.0, 108.0, 100.0, 106.0), // TR = 8
            (106.0, 107.0, 98.0, 99.0),   // TR = 9
            (99.0, 103.0, 97.0, 101.0),   // TR = 6
        ]);
        let atr = wilder_atr(&bars, 3);
        assert!(atr[0].is_none());
        assert!(atr[1].is_none());
        // Seed: mean(10, 8, 9) = 9
        assert!((atr[2].unwrap() - 9.0).abs() < 1e-12);
        // Next: (1/3)*6 + (2/3)*9 = 8
        assert!((atr[3].unwrap() - 8.0).abs() < 1e-12);
    }

    #[test]
    fn atr_short_series_is_all_none() {
        let bars = make_ohlc_bars(&[(100.0, 105.0, 95.0, 102.0)]);
        assert!(wilder_atr(&bars, 14).iter().all(Option::is_none));
    }

    #[test]
    fn median_odd_even_empty() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}

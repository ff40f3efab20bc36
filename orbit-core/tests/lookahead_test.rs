//! Look-ahead containment tests.
//!
//! Invariant: a strategy invoked at bar `i` can observe bars `0..=i` only.
//! Any access past `i` must fail with `LookaheadError`, and the decisions a
//! strategy makes on a prefix of the data must be identical whether or not
//! the future bars exist in the dataset.

use chrono::{NaiveDate, NaiveDateTime};
use orbit_core::domain::{Bar, Decision};
use orbit_core::engine::Observer;
use orbit_core::error::StrategyError;
use orbit_core::strategy::{PortfolioSnapshot, Strategy};
use orbit_core::{Dataset, Engine, EngineConfig, PriceView};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn ts(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 9, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn make_bars(day: u32, n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            // Deterministic pseudo-random walk via an LCG.
            let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1);
            let drift = ((seed % 200) as f64 - 100.0) * 0.01;
            let close = 100.0 + drift;
            Bar {
                ticker: "ES".into(),
                timestamp: ts(day, 9, 30) + chrono::Duration::minutes(5 * i as i64),
                open: close - 0.2,
                high: close + 0.5,
                low: close - 0.6,
                close,
                volume: 1_000 + i as u64,
            }
        })
        .collect()
}

fn dataset_of(bars: Vec<Bar>) -> Dataset {
    let mut series = BTreeMap::new();
    series.insert("ES".to_string(), bars);
    Dataset::new(series, chrono_tz::America::New_York).unwrap()
}

fn config() -> EngineConfig {
    EngineConfig {
        initial_capital: 100_000.0,
        tickers: vec!["ES".into()],
        start_date: NaiveDate::from_ymd_opt(2025, 9, 20).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 9, 30).unwrap(),
        margin_requirement: 0.5,
        commission_per_trade: 0.0,
        slippage_bps: 0.0,
        spread_bps: 0.0,
        trading_window_start: chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        trading_window_end: chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
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

/// Probes one bar past the view limit on every call and counts the
/// `LookaheadError`s it collects.
struct ProbeStrategy {
    lookahead_errors: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl Strategy for ProbeStrategy {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn on_session_start(&mut self, _date: NaiveDate) {}

    fn generate(
        &mut self,
        view: &PriceView<'_>,
        _portfolio: &PortfolioSnapshot,
        _bar: &Bar,
    ) -> Result<Decision, StrategyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        // In-range access works...
        assert!(view.bar(view.len() - 1).is_ok());
        // ...one past the limit must not.
        if view.bar(view.len()).is_err() {
            self.lookahead_errors.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Decision::hold("probing"))
    }
}

#[test]
fn future_bars_are_unreachable_from_the_strategy() {
    let dataset = dataset_of(make_bars(23, 20));
    let errors = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let mut probe = ProbeStrategy {
        lookahead_errors: errors.clone(),
        calls: calls.clone(),
    };

    let observer = Observer::with_sink(Box::new(std::io::sink()), None);
    let mut engine = Engine::with_observer(config(), &dataset, observer);
    engine.run(&mut probe).unwrap();

    let calls = calls.load(Ordering::SeqCst);
    assert!(calls > 0, "probe was never consulted");
    assert_eq!(errors.load(Ordering::SeqCst), calls);
}

/// Records the close the strategy saw at each bar index. Runs over a prefix
/// dataset and the full dataset must observe identical values.
struct RecordingStrategy {
    seen: Vec<f64>,
}

impl Strategy for RecordingStrategy {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn on_session_start(&mut self, _date: NaiveDate) {}

    fn generate(
        &mut self,
        view: &PriceView<'_>,
        _portfolio: &PortfolioSnapshot,
        _bar: &Bar,
    ) -> Result<Decision, StrategyError> {
        self.seen.push(view.current().close);
        Ok(Decision::hold("recording"))
    }
}

#[test]
fn prefix_and_full_datasets_agree_on_the_prefix() {
    let full_bars = make_bars(23, 40);
    let prefix_bars = full_bars[..25].to_vec();

    let run = |bars: Vec<Bar>| {
        let dataset = dataset_of(bars);
        let mut strategy = RecordingStrategy { seen: Vec::new() };
        let observer = Observer::with_sink(Box::new(std::io::sink()), None);
        let mut engine = Engine::with_observer(config(), &dataset, observer);
        engine.run(&mut strategy).unwrap();
        strategy.seen
    };

    let prefix_seen = run(prefix_bars);
    let full_seen = run(full_bars);
    assert_eq!(prefix_seen.len(), 25);
    assert_eq!(&full_seen[..25], &prefix_seen[..]);
}

#[test]
fn view_errors_carry_the_offending_index() {
    let bars = make_bars(23, 10);
    let view = PriceView::new(&bars, 3);
    let err = view.bar(7).unwrap_err();
    assert_eq!(err.requested, 7);
    assert_eq!(err.limit, 3);
}

//! Bar-by-bar event loop — the heart of the engine.
//!
//! Fixed order inside every bar:
//! 1. session boundary bookkeeping (new calendar date resets daily state)
//! 2. duplicate-bar guard
//! 3. intrabar matcher (may exit open brackets)
//! 4. strategy, if the eligibility gate passes
//! 5. executor, if the strategy returned a non-hold decision
//! 6. daily NAV snapshot on the last bar of the date
//! 7. observer (exactly once per iteration)
//!
//! Engine failures unwind the loop; the caller still reads the partial trade
//! log, NAV series and determinism hash off the engine. Strategy failures
//! are logged, coerced to hold, and the loop continues.

use crate::config::EngineConfig;
use crate::data::Dataset;
use crate::domain::{ActivePosition, Bar, Decision, Portfolio, RoundTrip, TradeRecord};
use crate::engine::executor::{ExecError, ExecOutcome, Executor};
use crate::engine::matcher::Matcher;
use crate::engine::observer::Observer;
use crate::error::EngineError;
use crate::rng::SeedBank;
use crate::strategy::{Eligibility, PortfolioSnapshot, SkipReason, Strategy};
use crate::view::PriceView;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

/// One end-of-session NAV observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyNav {
    pub date: NaiveDate,
    pub nav: f64,
}

pub struct Engine<'d> {
    config: EngineConfig,
    dataset: &'d Dataset,
    executor: Executor,
    matcher: Matcher,
    observer: Observer,
    seed_bank: SeedBank,

    portfolio: Portfolio,
    active: BTreeMap<String, ActivePosition>,
    trades: Vec<TradeRecord>,
    round_trips: Vec<RoundTrip>,
    daily_nav: Vec<DailyNav>,

    trades_today: BTreeMap<String, u32>,
    seen: HashSet<(String, NaiveDateTime)>,
    last_close: BTreeMap<String, f64>,
    current_date: Option<NaiveDate>,
    bars_processed: usize,
    strategy_failures: usize,
}

impl<'d> Engine<'d> {
    pub fn new(config: EngineConfig, dataset: &'d Dataset) -> Self {
        let observer = Observer::stderr(config.snapshot_dir.clone());
        Self::with_observer(config, dataset, observer)
    }

    /// Engine with an injected observer sink (tests capture the invariant
    /// stream this way).
    pub fn with_observer(config: EngineConfig, dataset: &'d Dataset, observer: Observer) -> Self {
        let executor = Executor {
            commission_per_trade: config.commission_per_trade,
            friction: config.friction(),
            initial_capital: config.initial_capital,
            max_ticker_exposure: 0.2,
        };
        let matcher = Matcher {
            time_invalidation_bars: config.time_invalidation_bars,
            time_invalidation_mfe_r: config.time_invalidation_mfe_r,
        };
        let portfolio = Portfolio::new(config.initial_capital, config.margin_requirement);
        let seed_bank = SeedBank::new(config.seed);
        Self {
            config,
            dataset,
            executor,
            matcher,
            observer,
            seed_bank,
            portfolio,
            active: BTreeMap::new(),
            trades: Vec::new(),
            round_trips: Vec::new(),
            daily_nav: Vec::new(),
            trades_today: BTreeMap::new(),
            seen: HashSet::new(),
            last_close: BTreeMap::new(),
            current_date: None,
            bars_processed: 0,
            strategy_failures: 0,
        }
    }

    /// Replay every bar through the strategy. Blocking; returns when the
    /// last bar is processed or an engine failure aborts the run.
    pub fn run(&mut self, strategy: &mut dyn Strategy) -> Result<(), EngineError> {
        // The seed is applied exactly once per engine; a second `run` on the
        // same engine would replay into mutated state and is refused.
        let _rng = self
            .seed_bank
            .seed_once()
            .map_err(|e| EngineError::Determinism(e.to_string()))?;

        let dataset = self.dataset;
        let order = dataset.order();
        for i in 0..order.len() {
            let bar = dataset.bar(&order[i]);
            let next_date = order.get(i + 1).map(|r| dataset.bar(r).date());
            let last_of_date = next_date != Some(bar.date());
            self.process_bar(i, bar, order[i].index, last_of_date, strategy)?;

            // Fail-fast loop invariants.
            if self.bars_processed != i + 1 {
                return Err(EngineError::failure(
                    i,
                    bar.ticker.clone(),
                    bar.timestamp,
                    format!("processed-bar count {} != {}", self.bars_processed, i + 1),
                ));
            }
            if self.observer.lines_emitted() != i + 1 {
                return Err(EngineError::failure(
                    i,
                    bar.ticker.clone(),
                    bar.timestamp,
                    format!(
                        "observer emitted {} lines after {} bars",
                        self.observer.lines_emitted(),
                        i + 1
                    ),
                ));
            }
        }

        if let Some(expected) = self.config.expected_hash.clone() {
            let actual = self.observer.final_hash();
            if actual != expected {
                return Err(EngineError::Determinism(format!(
                    "hash mismatch: expected {expected}, got {actual}"
                )));
            }
        }
        Ok(())
    }

    fn process_bar(
        &mut self,
        index: usize,
        bar: &Bar,
        series_index: usize,
        last_of_date: bool,
        strategy: &mut dyn Strategy,
    ) -> Result<(), EngineError> {
        // ── 1. Session boundary ──
        let date = bar.date();
        match self.current_date {
            Some(prev) if prev == date => {}
            Some(prev) if prev > date => {
                return Err(EngineError::failure(
                    index,
                    bar.ticker.clone(),
                    bar.timestamp,
                    format!("date regression: {prev} then {date}"),
                ));
            }
            _ => {
                self.trades_today.clear();
                strategy.on_session_start(date);
                self.current_date = Some(date);
            }
        }

        // ── 2. Duplicate guard ──
        if !self.seen.insert((bar.ticker.clone(), bar.timestamp)) {
            return Err(EngineError::failure(
                index,
                bar.ticker.clone(),
                bar.timestamp,
                "duplicate bar",
            ));
        }

        self.last_close.insert(bar.ticker.clone(), bar.close);

        // ── 3. Intrabar matcher ──
        if let Some(mut pos) = self.active.remove(&bar.ticker) {
            match self.matcher.check(&mut pos, bar) {
                Some(exit) => {
                    let (record, round_trip) = self.executor.execute_exit(
                        index,
                        &pos,
                        bar,
                        exit.price,
                        exit.reason,
                        &mut self.portfolio,
                        &self.last_close,
                    )?;
                    info!(
                        ticker = %bar.ticker,
                        reason = exit.reason.as_str(),
                        price = exit.price,
                        "position closed"
                    );
                    self.trades.push(record);
                    self.round_trips.push(round_trip);
                }
                None => {
                    self.active.insert(bar.ticker.clone(), pos);
                }
            }
        }

        // ── 4–5. Strategy + executor ──
        match self.eligibility(bar) {
            Eligibility::Skip(_) => {}
            Eligibility::Eligible => {
                let view = PriceView::new(self.dataset.bars(&bar.ticker), series_index);
                let snapshot = PortfolioSnapshot::of(&self.portfolio, &self.last_close);
                match strategy.generate(&view, &snapshot, bar) {
                    Err(e) => {
                        warn!(
                            index,
                            ticker = %bar.ticker,
                            timestamp = %bar.timestamp,
                            error = %e,
                            "strategy failure; coercing to hold"
                        );
                        self.strategy_failures += 1;
                    }
                    Ok(decision) => self.apply_decision(index, bar, &decision)?,
                }
            }
        }

        // ── 6. Daily NAV snapshot ──
        if last_of_date {
            let nav = self.portfolio.nav(&self.last_close);
            if let Some(last) = self.daily_nav.last() {
                if last.date >= date {
                    return Err(EngineError::failure(
                        index,
                        bar.ticker.clone(),
                        bar.timestamp,
                        format!("daily NAV series not increasing: {} then {date}", last.date),
                    ));
                }
            }
            self.daily_nav.push(DailyNav { date, nav });
        }

        // ── 7. Observer ──
        let nav = self.portfolio.nav(&self.last_close);
        let trades_today = self.trades_today.get(&bar.ticker).copied().unwrap_or(0);
        self.observer.observe(
            index,
            bar,
            nav,
            self.active.len(),
            trades_today,
            &self.portfolio,
            self.trades.len(),
        )?;

        self.bars_processed += 1;
        Ok(())
    }

    fn apply_decision(
        &mut self,
        index: usize,
        bar: &Bar,
        decision: &Decision,
    ) -> Result<(), EngineError> {
        let outcome = self.executor.execute_decision(
            index,
            decision,
            bar,
            &mut self.portfolio,
            &mut self.active,
            &self.last_close,
        );
        match outcome {
            Ok(ExecOutcome::Hold) => {}
            Ok(ExecOutcome::Blocked(reason)) => {
                info!(
                    index,
                    ticker = %bar.ticker,
                    reason = reason.as_str(),
                    "trade blocked; holding"
                );
            }
            Ok(ExecOutcome::Filled(record)) => {
                let is_entry = record.action.is_entry();
                info!(
                    index,
                    ticker = %bar.ticker,
                    action = record.action.as_str(),
                    quantity = record.quantity,
                    price = record.executed_price,
                    "trade executed"
                );
                self.trades.push(record);
                *self.trades_today.entry(bar.ticker.clone()).or_insert(0) += 1;

                // No one-bar grace: an entry whose bar already trades through
                // the stop exits at the stop on this same bar.
                if is_entry {
                    if let Some(pos) = self.active.get(&bar.ticker) {
                        if let Some(exit) = self.matcher.check_entry_bar(pos, bar) {
                            let pos = self.active.remove(&bar.ticker).expect("bracket exists");
                            let (record, round_trip) = self.executor.execute_exit(
                                index,
                                &pos,
                                bar,
                                exit.price,
                                exit.reason,
                                &mut self.portfolio,
                                &self.last_close,
                            )?;
                            info!(
                                ticker = %bar.ticker,
                                reason = exit.reason.as_str(),
                                "entry-bar stop"
                            );
                            self.trades.push(record);
                            self.round_trips.push(round_trip);
                        }
                    }
                }
            }
            Err(ExecError::Contract(c)) => {
                // Invalid shape from the strategy: a strategy failure, never
                // an abort.
                warn!(
                    index,
                    ticker = %bar.ticker,
                    timestamp = %bar.timestamp,
                    error = %c,
                    "invalid decision; coercing to hold"
                );
                self.strategy_failures += 1;
            }
            Err(ExecError::Engine(e)) => return Err(e),
        }
        Ok(())
    }

    /// The strategy is consulted only inside the trading window, with no
    /// open bracket, and before the first strategy trade of the day.
    fn eligibility(&self, bar: &Bar) -> Eligibility {
        let time = bar.timestamp.time();
        if time < self.config.trading_window_start || time > self.config.trading_window_end {
            return Eligibility::Skip(SkipReason::OutsideWindow);
        }
        if self.active.contains_key(&bar.ticker) {
            return Eligibility::Skip(SkipReason::ActivePosition);
        }
        if self.trades_today.get(&bar.ticker).copied().unwrap_or(0) > 0 {
            return Eligibility::Skip(SkipReason::DailyLimitReached);
        }
        Eligibility::Eligible
    }

    // ── Read access for the runner (partial summaries included) ──

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn round_trips(&self) -> &[RoundTrip] {
        &self.round_trips
    }

    pub fn daily_nav(&self) -> &[DailyNav] {
        &self.daily_nav
    }

    pub fn bars_processed(&self) -> usize {
        self.bars_processed
    }

    pub fn strategy_failures(&self) -> usize {
        self.strategy_failures
    }

    /// Final NAV at the last marks seen.
    pub fn final_nav(&self) -> f64 {
        self.portfolio.nav(&self.last_close)
    }

    /// Rolling determinism hash over all processed bars.
    pub fn determinism_hash(&self) -> String {
        self.observer.final_hash()
    }
}

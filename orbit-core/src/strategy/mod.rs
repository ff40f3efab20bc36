//! Strategy interface — the pluggable signal producer.
//!
//! A strategy sees a no-lookahead price view and a read-only portfolio
//! snapshot, and returns a `Decision`. It cannot touch engine state. A fault
//! inside `generate` (an `Err`, or a decision the executor rejects) is a
//! *strategy* failure: logged and coerced to hold, never an abort.

use crate::domain::portfolio::{Portfolio, Position, RealizedGains};
use crate::domain::{Bar, Decision};
use crate::error::StrategyError;
use crate::view::PriceView;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod orb;

pub use orb::{OrbParams, OrbStrategy};

/// Read-only copy of ledger state handed to strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub cash: f64,
    pub nav: f64,
    pub initial_capital: f64,
    pub positions: BTreeMap<String, Position>,
    pub realized_gains: BTreeMap<String, RealizedGains>,
}

impl PortfolioSnapshot {
    pub fn of(portfolio: &Portfolio, prices: &BTreeMap<String, f64>) -> Self {
        Self {
            cash: portfolio.cash,
            nav: portfolio.nav(prices),
            initial_capital: portfolio.initial_capital,
            positions: portfolio.positions.clone(),
            realized_gains: portfolio.realized_gains.clone(),
        }
    }

    pub fn total_realized(&self) -> f64 {
        self.realized_gains.values().map(|g| g.long + g.short).sum()
    }
}

/// Why the strategy was not consulted on a bar. Skipping is a value the loop
/// inspects, never an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    OutsideWindow,
    ActivePosition,
    DailyLimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Skip(SkipReason),
}

/// The signal producer contract.
pub trait Strategy {
    fn name(&self) -> &'static str;

    /// Called once at each calendar-date boundary, before the first
    /// `generate` of the new session. Per-session scratch resets here.
    fn on_session_start(&mut self, date: NaiveDate);

    /// Produce a decision for the current bar. Only called when the bar is
    /// inside the trading window, no position is open for the ticker, and no
    /// strategy trade has executed for the ticker today.
    fn generate(
        &mut self,
        view: &PriceView<'_>,
        portfolio: &PortfolioSnapshot,
        bar: &Bar,
    ) -> Result<Decision, StrategyError>;
}

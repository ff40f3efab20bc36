//! Trade executor — validated application of a decision to the ledger.
//!
//! Order of operations: shape validation, pre-trade constraint gate,
//! friction, ledger application, hard post-trade assertions, bracket
//! creation, trade-log append. A blocked trade is a logged outcome; a failed
//! post-trade assertion is an engine failure that aborts the run.

use crate::domain::portfolio::Portfolio;
use crate::domain::{
    Action, ActivePosition, Bar, Decision, ExitReason, RoundTrip, Side, TradeRecord,
};
use crate::error::{ContractError, EngineError};
use std::collections::BTreeMap;

/// Relative slack for the exposure-cap comparisons. Float sums of position
/// values need a hair of tolerance at the boundary.
const CAP_EPSILON: f64 = 1e-9;

/// Why a pre-trade constraint refused a fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlockReason {
    NavNonPositive,
    /// Entries stop once NAV falls to half the initial capital.
    DrawdownFloor,
    /// The ledger clamp left nothing to fill.
    InsufficientCapital,
    GrossExposureCap,
    TickerExposureCap,
    NavWouldGoNegative,
}

impl BlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockReason::NavNonPositive => "nav_non_positive",
            BlockReason::DrawdownFloor => "drawdown_floor",
            BlockReason::InsufficientCapital => "insufficient_capital",
            BlockReason::GrossExposureCap => "gross_exposure_cap",
            BlockReason::TickerExposureCap => "ticker_exposure_cap",
            BlockReason::NavWouldGoNegative => "nav_would_go_negative",
        }
    }
}

/// Result of pushing a decision through the executor.
#[derive(Debug)]
pub enum ExecOutcome {
    Filled(TradeRecord),
    Blocked(BlockReason),
    /// A hold decision — nothing to do.
    Hold,
}

/// Executor-level errors. `Contract` is a strategy failure when the decision
/// came from a strategy and an engine failure when synthesized internally;
/// the loop makes that call.
#[derive(Debug)]
pub enum ExecError {
    Contract(ContractError),
    Engine(EngineError),
}

impl From<EngineError> for ExecError {
    fn from(e: EngineError) -> Self {
        ExecError::Engine(e)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Executor {
    pub commission_per_trade: f64,
    /// `(slippage_bps + spread_bps) / 10_000`.
    pub friction: f64,
    pub initial_capital: f64,
    /// Per-ticker exposure cap as a fraction of NAV.
    pub max_ticker_exposure: f64,
}

impl Executor {
    /// Friction-adjusted fill price. Buys and covers pay up; sells and
    /// shorts receive less.
    pub fn frictioned_price(&self, action: Action, requested: f64) -> f64 {
        match action {
            Action::Buy | Action::Cover => requested * (1.0 + self.friction),
            Action::Sell | Action::Short => requested * (1.0 - self.friction),
            Action::Hold => requested,
        }
    }

    /// Execute a strategy decision at the bar's close.
    ///
    /// `prices` are the current marks (used for NAV and exposure); the
    /// traded ticker must already be marked at this bar's close.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_decision(
        &self,
        index: usize,
        decision: &Decision,
        bar: &Bar,
        portfolio: &mut Portfolio,
        active: &mut BTreeMap<String, ActivePosition>,
        prices: &BTreeMap<String, f64>,
    ) -> Result<ExecOutcome, ExecError> {
        let requested = bar.close;
        decision.validate(requested).map_err(ExecError::Contract)?;
        if decision.action == Action::Hold {
            return Ok(ExecOutcome::Hold);
        }

        let executed = self.frictioned_price(decision.action, requested);
        if decision.action.is_entry() && decision.stop_loss == Some(executed) {
            // The requested-price check passed but friction moved the fill
            // onto the stop. Catch it before any ledger mutation.
            return Err(ExecError::Contract(ContractError::DegenerateStop(executed)));
        }

        // ── Pre-trade constraint gate ──
        let nav_now = portfolio.nav(prices);
        if nav_now <= 0.0 {
            return Ok(ExecOutcome::Blocked(BlockReason::NavNonPositive));
        }
        if decision.action.is_entry() && nav_now <= 0.5 * self.initial_capital {
            return Ok(ExecOutcome::Blocked(BlockReason::DrawdownFloor));
        }

        // Probe the trade on a copy of the ledger, then inspect the result.
        let mut probe = portfolio.clone();
        let realized_before = probe.total_realized();
        let applied = apply_to_ledger(
            &mut probe,
            decision.action,
            &bar.ticker,
            decision.quantity,
            executed,
            self.commission_per_trade,
        );
        if applied == 0 {
            return Ok(ExecOutcome::Blocked(BlockReason::InsufficientCapital));
        }

        let nav_post = probe.nav(prices);
        let gross_post = probe.gross_exposure(prices);
        let mark = prices.get(&bar.ticker).copied().unwrap_or(requested);
        let ticker_post = probe.ticker_exposure(&bar.ticker, mark);
        if nav_post < 0.0 {
            return Ok(ExecOutcome::Blocked(BlockReason::NavWouldGoNegative));
        }
        if gross_post > nav_post * (1.0 + CAP_EPSILON) {
            return Ok(ExecOutcome::Blocked(BlockReason::GrossExposureCap));
        }
        if ticker_post > self.max_ticker_exposure * nav_post * (1.0 + CAP_EPSILON) {
            return Ok(ExecOutcome::Blocked(BlockReason::TickerExposureCap));
        }

        // ── Commit and assert ──
        let realized_pnl = probe.total_realized() - realized_before;
        *portfolio = probe;
        self.assert_post_trade(index, bar, portfolio, prices)?;

        if decision.action.is_entry() {
            let side = match decision.action {
                Action::Buy => Side::Long,
                Action::Short => Side::Short,
                _ => unreachable!("is_entry covers buy and short only"),
            };
            // Validation guarantees both levels are present on entries.
            let stop_loss = decision.stop_loss.expect("validated entry has stop");
            let target = decision.target.expect("validated entry has target");
            active.insert(
                bar.ticker.clone(),
                ActivePosition {
                    side,
                    quantity: applied,
                    entry_price: executed,
                    requested_entry_price: requested,
                    stop_loss,
                    target,
                    entry_timestamp: bar.timestamp,
                    bars_since_entry: 0,
                    mfe: 0.0,
                    mae: 0.0,
                    confirmation: decision.confirmation,
                },
            );
        }

        Ok(ExecOutcome::Filled(TradeRecord {
            timestamp: bar.timestamp,
            ticker: bar.ticker.clone(),
            action: decision.action,
            quantity: applied,
            requested_price: requested,
            executed_price: executed,
            commission: self.commission_per_trade,
            slippage_cost: (executed - requested).abs() * applied as f64,
            realized_pnl,
            exit_reason: if decision.action.is_entry() {
                ExitReason::None
            } else {
                ExitReason::Strategy
            },
            confirmation: decision.confirmation,
        }))
    }

    /// Execute a matcher exit: the fill price is the matched level (or the
    /// close for time invalidation), never friction-adjusted. Commission is
    /// still charged and the post-trade assertions still run.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_exit(
        &self,
        index: usize,
        pos: &ActivePosition,
        bar: &Bar,
        exit_price: f64,
        reason: ExitReason,
        portfolio: &mut Portfolio,
        prices: &BTreeMap<String, f64>,
    ) -> Result<(TradeRecord, RoundTrip), EngineError> {
        let action = match pos.side {
            Side::Long => Action::Sell,
            Side::Short => Action::Cover,
        };

        let realized_before = portfolio.total_realized();
        let applied = apply_to_ledger(
            portfolio,
            action,
            &bar.ticker,
            pos.quantity,
            exit_price,
            self.commission_per_trade,
        );
        if applied != pos.quantity {
            return Err(EngineError::failure(
                index,
                bar.ticker.clone(),
                bar.timestamp,
                format!(
                    "ledger inconsistency: bracket holds {} but only {applied} closed",
                    pos.quantity
                ),
            ));
        }
        let realized_pnl = portfolio.total_realized() - realized_before;
        self.assert_post_trade(index, bar, portfolio, prices)
            .map_err(|e| match e {
                ExecError::Engine(e) => e,
                ExecError::Contract(c) => EngineError::InternalContract {
                    index,
                    ticker: bar.ticker.clone(),
                    timestamp: bar.timestamp,
                    source: c,
                },
            })?;

        let record = TradeRecord {
            timestamp: bar.timestamp,
            ticker: bar.ticker.clone(),
            action,
            quantity: applied,
            requested_price: exit_price,
            executed_price: exit_price,
            commission: self.commission_per_trade,
            slippage_cost: 0.0,
            realized_pnl,
            exit_reason: reason,
            confirmation: pos.confirmation,
        };

        let sign = pos.side.sign();
        let r_risk = pos.r_risk();
        let r_risk_pre = (pos.requested_entry_price - pos.stop_loss).abs().max(f64::MIN_POSITIVE);
        let pnl_per_contract = (exit_price - pos.entry_price) * sign;
        let pnl_per_contract_pre = (exit_price - pos.requested_entry_price) * sign;
        let gross_pnl = pnl_per_contract * applied as f64;

        let round_trip = RoundTrip {
            ticker: bar.ticker.clone(),
            side: pos.side,
            quantity: applied,
            entry_timestamp: pos.entry_timestamp,
            exit_timestamp: bar.timestamp,
            requested_entry_price: pos.requested_entry_price,
            entry_price: pos.entry_price,
            exit_price,
            bars_held: pos.bars_since_entry,
            mfe_r: pos.mfe_r(),
            mae_r: pos.mae_r(),
            r_multiple: pnl_per_contract_pre / r_risk_pre,
            r_multiple_after_friction: pnl_per_contract / r_risk,
            gross_pnl,
            net_pnl: gross_pnl - 2.0 * self.commission_per_trade,
            commission: 2.0 * self.commission_per_trade,
            exit_reason: reason,
            confirmation: pos.confirmation,
        };

        Ok((record, round_trip))
    }

    /// Hard invariants after every committed trade. A breach here is a bug
    /// in the ledger or the gate, and the run must not continue.
    fn assert_post_trade(
        &self,
        index: usize,
        bar: &Bar,
        portfolio: &Portfolio,
        prices: &BTreeMap<String, f64>,
    ) -> Result<(), ExecError> {
        let fail = |detail: String| {
            ExecError::Engine(EngineError::failure(
                index,
                bar.ticker.clone(),
                bar.timestamp,
                detail,
            ))
        };

        if !portfolio.cash.is_finite() {
            return Err(fail(format!("cash is not finite: {}", portfolio.cash)));
        }
        let nav = portfolio.nav(prices);
        if !nav.is_finite() {
            return Err(fail(format!("NAV is not finite: {nav}")));
        }
        if nav < 0.0 {
            return Err(fail(format!("negative NAV after trade: {nav:.4}")));
        }
        let gross = portfolio.gross_exposure(prices);
        if nav > 0.0 && gross > nav * (1.0 + CAP_EPSILON) {
            return Err(fail(format!(
                "gross exposure {gross:.4} exceeds NAV {nav:.4}"
            )));
        }
        for (ticker, _) in portfolio.positions.iter().filter(|(_, p)| !p.is_flat()) {
            let mark = prices.get(ticker).copied();
            if let Some(mark) = mark {
                let exposure = portfolio.ticker_exposure(ticker, mark);
                if nav > 0.0 && exposure > self.max_ticker_exposure * nav * (1.0 + CAP_EPSILON) {
                    return Err(fail(format!(
                        "{ticker} exposure {exposure:.4} exceeds {:.0}% of NAV {nav:.4}",
                        self.max_ticker_exposure * 100.0
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Route an action to the matching ledger operation. Returns the applied
/// (possibly clamped) quantity.
fn apply_to_ledger(
    portfolio: &mut Portfolio,
    action: Action,
    ticker: &str,
    qty: u32,
    px: f64,
    commission: f64,
) -> u32 {
    match action {
        Action::Buy => portfolio.buy(ticker, qty, px, commission),
        Action::Sell => portfolio.sell(ticker, qty, px, commission),
        Action::Short => portfolio.short(ticker, qty, px, commission),
        Action::Cover => portfolio.cover(ticker, qty, px, commission),
        Action::Hold => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Confirmation;
    use chrono::NaiveDate;

    fn executor() -> Executor {
        Executor {
            commission_per_trade: 2.0,
            friction: 7e-4,
            initial_capital: 100_000.0,
            max_ticker_exposure: 0.2,
        }
    }

    fn bar(close: f64) -> Bar {
        Bar {
            ticker: "ES".into(),
            timestamp: NaiveDate::from_ymd_opt(2025, 9, 23)
                .unwrap()
                .and_hms_opt(9, 50, 0)
                .unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: 1_000,
        }
    }

    fn buy_decision(qty: u32) -> Decision {
        Decision {
            action: Action::Buy,
            quantity: qty,
            stop_loss: Some(95.0),
            target: Some(110.0),
            confidence: 70,
            reasoning: "test entry".into(),
            confirmation: Some(Confirmation::Engulfing),
        }
    }

    fn setup() -> (Portfolio, BTreeMap<String, ActivePosition>, BTreeMap<String, f64>) {
        let portfolio = Portfolio::new(100_000.0, 0.5);
        let active = BTreeMap::new();
        let mut prices = BTreeMap::new();
        prices.insert("ES".to_string(), 100.0);
        (portfolio, active, prices)
    }

    #[test]
    fn entry_applies_friction_and_creates_bracket() {
        let (mut portfolio, mut active, prices) = setup();
        let outcome = executor()
            .execute_decision(0, &buy_decision(10), &bar(100.0), &mut portfolio, &mut active, &prices)
            .unwrap();

        let ExecOutcome::Filled(record) = outcome else {
            panic!("expected fill, got {outcome:?}");
        };
        assert_eq!(record.quantity, 10);
        assert!((record.executed_price - 100.0 * 1.0007).abs() < 1e-9);
        assert!((record.slippage_cost - 0.07 * 10.0).abs() < 1e-9);
        assert_eq!(record.exit_reason, ExitReason::None);

        let pos = &active["ES"];
        assert_eq!(pos.side, Side::Long);
        assert_eq!(pos.quantity, 10);
        assert_eq!(pos.bars_since_entry, 0);
        assert_eq!(pos.confirmation, Some(Confirmation::Engulfing));
    }

    #[test]
    fn invalid_decision_is_contract_error() {
        let (mut portfolio, mut active, prices) = setup();
        let mut decision = buy_decision(10);
        decision.stop_loss = None;
        let err = executor()
            .execute_decision(0, &decision, &bar(100.0), &mut portfolio, &mut active, &prices)
            .unwrap_err();
        assert!(matches!(err, ExecError::Contract(ContractError::MissingStop(_))));
        // Nothing was applied.
        assert_eq!(portfolio.cash, 100_000.0);
        assert!(active.is_empty());
    }

    #[test]
    fn hold_is_a_no_op() {
        let (mut portfolio, mut active, prices) = setup();
        let outcome = executor()
            .execute_decision(0, &Decision::hold("flat"), &bar(100.0), &mut portfolio, &mut active, &prices)
            .unwrap();
        assert!(matches!(outcome, ExecOutcome::Hold));
    }

    #[test]
    fn ticker_exposure_cap_blocks_oversized_entry() {
        let (mut portfolio, mut active, prices) = setup();
        // 250 contracts at ~100 = 25k > 20% of 100k.
        let outcome = executor()
            .execute_decision(0, &buy_decision(250), &bar(100.0), &mut portfolio, &mut active, &prices)
            .unwrap();
        assert!(matches!(outcome, ExecOutcome::Blocked(BlockReason::TickerExposureCap)));
        assert_eq!(portfolio.cash, 100_000.0);
        assert!(active.is_empty());
    }

    #[test]
    fn drawdown_floor_blocks_entries() {
        let (mut portfolio, mut active, prices) = setup();
        portfolio.cash = 45_000.0; // NAV ≤ 0.5 · initial
        let outcome = executor()
            .execute_decision(0, &buy_decision(1), &bar(100.0), &mut portfolio, &mut active, &prices)
            .unwrap();
        assert!(matches!(outcome, ExecOutcome::Blocked(BlockReason::DrawdownFloor)));
    }

    #[test]
    fn exit_fills_exactly_at_level() {
        let (mut portfolio, mut active, prices) = setup();
        let exec = executor();
        exec.execute_decision(0, &buy_decision(10), &bar(100.0), &mut portfolio, &mut active, &prices)
            .unwrap();
        let pos = active.remove("ES").unwrap();

        let (record, rt) = exec
            .execute_exit(1, &pos, &bar(96.0), 95.0, ExitReason::StopLoss, &mut portfolio, &prices)
            .unwrap();
        assert_eq!(record.executed_price, 95.0);
        assert_eq!(record.requested_price, 95.0);
        assert_eq!(record.slippage_cost, 0.0);
        assert_eq!(record.exit_reason, ExitReason::StopLoss);

        // Stop exactly at level → post-friction loss is exactly −1R.
        assert!((rt.r_multiple_after_friction + 1.0).abs() < 1e-9);
        assert_eq!(rt.exit_reason, ExitReason::StopLoss);
        assert_eq!(rt.commission, 4.0);
    }

    #[test]
    fn round_trip_conserves_value() {
        let (mut portfolio, mut active, prices) = setup();
        let exec = executor();
        exec.execute_decision(0, &buy_decision(10), &bar(100.0), &mut portfolio, &mut active, &prices)
            .unwrap();
        let pos = active.remove("ES").unwrap();
        let (_, rt) = exec
            .execute_exit(1, &pos, &bar(105.0), 105.0, ExitReason::Target, &mut portfolio, &prices)
            .unwrap();

        // Δcash = realized − commissions (flat book: equity change is zero).
        let delta_cash = portfolio.cash - 100_000.0;
        let expected = portfolio.total_realized() - portfolio.total_commission;
        assert!((delta_cash - expected).abs() < 1e-9);
        assert!((rt.net_pnl - (rt.gross_pnl - 4.0)).abs() < 1e-12);
    }

    #[test]
    fn short_round_trip_through_executor() {
        let (mut portfolio, mut active, prices) = setup();
        let exec = executor();
        let decision = Decision {
            action: Action::Short,
            quantity: 10,
            stop_loss: Some(105.0),
            target: Some(92.0),
            confidence: 60,
            reasoning: "short test".into(),
            confirmation: None,
        };
        exec.execute_decision(0, &decision, &bar(100.0), &mut portfolio, &mut active, &prices)
            .unwrap();
        let pos = active.remove("ES").unwrap();
        assert_eq!(pos.side, Side::Short);
        // Short receives less than requested.
        assert!(pos.entry_price < 100.0);

        let (record, rt) = exec
            .execute_exit(1, &pos, &bar(93.0), 92.0, ExitReason::Target, &mut portfolio, &prices)
            .unwrap();
        assert_eq!(record.action, Action::Cover);
        assert!(rt.gross_pnl > 0.0);
        assert!(portfolio.position("ES").is_none());
    }
}

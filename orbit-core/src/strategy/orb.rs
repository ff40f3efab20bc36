//! Reference strategy: opening-range breakout with pullback confirmation.
//!
//! Session flow:
//! 1. The opening range (OR) is the high/low of the first
//!    `opening_range_minutes` after session open; entries are allowed until
//!    60 minutes after open.
//! 2. Regime filter: 14-bar ATR must exceed the median of the last 20
//!    completed sessions' closing ATRs (passes while history is short).
//! 3. The first post-OR bar trading through OR.high (long) or OR.low (short)
//!    records the breakout; the breakout bar itself is never an entry.
//! 4. A later bar retracing 50–70% of the breakout bar's range, confirmed by
//!    an engulfing / near-engulfing / strong-close pattern, enters at the
//!    close with a stop beyond the pullback extreme and a 1.5R target.
//!
//! The strategy recomputes session state from the price view on every call,
//! so its decisions are a pure function of `(view, snapshot, bar)` plus the
//! per-session P&L baseline.

use crate::config::EngineConfig;
use crate::domain::{Action, Bar, Confirmation, Decision, Side};
use crate::error::StrategyError;
use crate::indicators::{median, wilder_atr};
use crate::strategy::{PortfolioSnapshot, Strategy};
use crate::view::PriceView;
use chrono::{Duration, NaiveDate, NaiveDateTime};

#[derive(Debug, Clone)]
pub struct OrbParams {
    pub opening_range_minutes: u32,
    /// Entries stop this many minutes after session open.
    pub entry_window_minutes: u32,
    pub retrace_min: f64,
    pub retrace_max: f64,
    /// Stop distance beyond the pullback extreme, as a fraction of the
    /// pullback bar's range.
    pub stop_range_fraction: f64,
    pub target_r_multiple: f64,
    pub risk_per_trade_pct: f64,
    pub max_contracts: u32,
    pub atr_period: usize,
    pub atr_median_sessions: usize,
    /// Near-engulfing: current body must cover this fraction of the prior body.
    pub body_overlap_min: f64,
    /// Stop trading for the day once session P&L reaches −this·R.
    pub daily_loss_limit_r: f64,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            opening_range_minutes: 15,
            entry_window_minutes: 60,
            retrace_min: 0.50,
            retrace_max: 0.70,
            stop_range_fraction: 0.10,
            target_r_multiple: 1.5,
            risk_per_trade_pct: 0.0025,
            max_contracts: 1,
            atr_period: 14,
            atr_median_sessions: 20,
            body_overlap_min: 0.80,
            daily_loss_limit_r: 0.5,
        }
    }
}

impl OrbParams {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            opening_range_minutes: config.opening_range_minutes,
            risk_per_trade_pct: config.risk_per_trade_pct,
            ..Self::default()
        }
    }
}

/// Breakout bookkeeping, derived from the view on each call.
#[derive(Debug, Clone, Copy, PartialEq)]
struct BreakoutState {
    side: Side,
    bar_timestamp: NaiveDateTime,
    /// High − low of the breakout bar, the retracement denominator.
    breakout_range: f64,
    breakout_high: f64,
    breakout_low: f64,
}

#[derive(Debug)]
pub struct OrbStrategy {
    params: OrbParams,
    session_date: Option<NaiveDate>,
    realized_at_session_start: Option<f64>,
    session_risk_dollars: Option<f64>,
}

impl OrbStrategy {
    pub fn new(params: OrbParams) -> Self {
        Self {
            params,
            session_date: None,
            realized_at_session_start: None,
            session_risk_dollars: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(OrbParams::from_config(config))
    }
}

impl Strategy for OrbStrategy {
    fn name(&self) -> &'static str {
        "orb_pullback"
    }

    fn on_session_start(&mut self, date: NaiveDate) {
        self.session_date = Some(date);
        self.realized_at_session_start = None;
        self.session_risk_dollars = None;
    }

    fn generate(
        &mut self,
        view: &PriceView<'_>,
        portfolio: &PortfolioSnapshot,
        bar: &Bar,
    ) -> Result<Decision, StrategyError> {
        let today = bar.date();
        if self.session_date != Some(today) {
            // Engine guarantees on_session_start, but stay correct if a host
            // drives the strategy directly.
            self.on_session_start(today);
        }
        let baseline = *self
            .realized_at_session_start
            .get_or_insert_with(|| portfolio.total_realized());

        // Session guards: done for the day after a win or past the loss limit.
        let day_pnl = portfolio.total_realized() - baseline;
        if day_pnl > 0.0 {
            return Ok(Decision::hold("win booked; done for the session"));
        }
        if let Some(risk) = self.session_risk_dollars {
            if risk > 0.0 && day_pnl <= -self.params.daily_loss_limit_r * risk {
                return Ok(Decision::hold("session loss limit reached"));
            }
        }

        let bars_today = session_bars(view.upto(), today);
        let session_open = bars_today[0].timestamp;
        let or_end = session_open + Duration::minutes(self.params.opening_range_minutes as i64);
        let entry_deadline =
            session_open + Duration::minutes(self.params.entry_window_minutes as i64);

        if bar.timestamp < or_end {
            return Ok(Decision::hold("opening range forming"));
        }
        if bar.timestamp >= entry_deadline {
            return Ok(Decision::hold("entry window closed"));
        }

        let Some((or_high, or_low)) = opening_range(bars_today, or_end) else {
            return Ok(Decision::hold("no opening-range bars"));
        };

        if !self.regime_allows(view) {
            return Ok(Decision::hold("ATR below session median"));
        }

        // Breakout must have happened on an earlier bar of this session.
        let prior_bars = &bars_today[..bars_today.len() - 1];
        let Some(breakout) = find_breakout(prior_bars, or_end, or_high, or_low) else {
            return Ok(Decision::hold("no breakout yet"));
        };
        if breakout.breakout_range <= 0.0 {
            return Ok(Decision::hold("degenerate breakout bar"));
        }

        let retrace = match breakout.side {
            Side::Long => (breakout.breakout_high - bar.low) / breakout.breakout_range,
            Side::Short => (bar.high - breakout.breakout_low) / breakout.breakout_range,
        };
        if retrace < self.params.retrace_min || retrace > self.params.retrace_max {
            return Ok(Decision::hold("retracement outside band"));
        }

        let Some(prev) = prior_bars.last() else {
            return Ok(Decision::hold("no prior bar for confirmation"));
        };
        let Some(confirmation) = confirm(breakout.side, prev, bar, self.params.body_overlap_min)
        else {
            return Ok(Decision::hold("no confirmation pattern"));
        };

        // Stop beyond the pullback extreme, target on the favorable side.
        let entry = bar.close;
        let stop_offset = self.params.stop_range_fraction * bar.range();
        let (action, stop, target) = match breakout.side {
            Side::Long => {
                let stop = bar.low - stop_offset;
                (
                    Action::Buy,
                    stop,
                    entry + self.params.target_r_multiple * (entry - stop),
                )
            }
            Side::Short => {
                let stop = bar.high + stop_offset;
                (
                    Action::Short,
                    stop,
                    entry - self.params.target_r_multiple * (stop - entry),
                )
            }
        };
        let risk = (entry - stop).abs();
        if risk <= 0.0 {
            return Ok(Decision::hold("degenerate risk"));
        }

        let sized = (self.params.risk_per_trade_pct * portfolio.nav / risk).floor() as u32;
        let quantity = sized.max(1).min(self.params.max_contracts);
        self.session_risk_dollars = Some(risk * quantity as f64);

        let confidence = match confirmation {
            Confirmation::Engulfing => 80,
            Confirmation::NearEngulfing => 70,
            Confirmation::StrongClose => 60,
        };
        Ok(Decision {
            action,
            quantity,
            stop_loss: Some(stop),
            target: Some(target),
            confidence,
            reasoning: format!(
                "OR breakout {} at {}, pullback {:.0}% of breakout range",
                breakout.side.as_str(),
                breakout.bar_timestamp.time(),
                retrace * 100.0
            ),
            confirmation: Some(confirmation),
        })
    }
}

impl OrbStrategy {
    /// ATR regime filter: trade only when the current ATR exceeds the median
    /// closing ATR of recent completed sessions. Short history passes — a
    /// fresh dataset has no regime to compare against.
    fn regime_allows(&self, view: &PriceView<'_>) -> bool {
        let bars = view.upto();
        let atr = wilder_atr(bars, self.params.atr_period);
        let Some(current) = atr.last().copied().flatten() else {
            return true;
        };

        let today = bars[bars.len() - 1].date();
        let mut session_closes: Vec<f64> = Vec::new();
        let mut i = 0;
        while i < bars.len() {
            let date = bars[i].date();
            if date >= today {
                break;
            }
            let mut last_of_session = i;
            while last_of_session + 1 < bars.len() && bars[last_of_session + 1].date() == date {
                last_of_session += 1;
            }
            if let Some(value) = atr[last_of_session] {
                session_closes.push(value);
            }
            i = last_of_session + 1;
        }

        let start = session_closes
            .len()
            .saturating_sub(self.params.atr_median_sessions);
        match median(&session_closes[start..]) {
            Some(m) => current > m,
            None => true,
        }
    }
}

/// Bars of the given calendar date (the tail of the visible slice).
fn session_bars(bars: &[Bar], date: NaiveDate) -> &[Bar] {
    let start = bars.partition_point(|b| b.date() < date);
    &bars[start..]
}

/// High/low envelope of the bars before `or_end`.
fn opening_range(bars_today: &[Bar], or_end: NaiveDateTime) -> Option<(f64, f64)> {
    let mut range: Option<(f64, f64)> = None;
    for bar in bars_today.iter().take_while(|b| b.timestamp < or_end) {
        range = Some(match range {
            None => (bar.high, bar.low),
            Some((h, l)) => (h.max(bar.high), l.min(bar.low)),
        });
    }
    range
}

/// First post-OR bar trading through the envelope. A bar that pierces both
/// sides at once is ambiguous and never recorded as a breakout.
fn find_breakout(
    bars_today: &[Bar],
    or_end: NaiveDateTime,
    or_high: f64,
    or_low: f64,
) -> Option<BreakoutState> {
    for bar in bars_today.iter().filter(|b| b.timestamp >= or_end) {
        let up = bar.high > or_high;
        let down = bar.low < or_low;
        let side = match (up, down) {
            (true, false) => Side::Long,
            (false, true) => Side::Short,
            (true, true) => continue,
            (false, false) => continue,
        };
        return Some(BreakoutState {
            side,
            bar_timestamp: bar.timestamp,
            breakout_range: bar.range(),
            breakout_high: bar.high,
            breakout_low: bar.low,
        });
    }
    None
}

/// Confirmation patterns, tried strongest first.
fn confirm(side: Side, prev: &Bar, cur: &Bar, body_overlap_min: f64) -> Option<Confirmation> {
    if classical_engulfing(side, prev, cur) {
        return Some(Confirmation::Engulfing);
    }
    if near_engulfing(side, prev, cur, body_overlap_min) {
        return Some(Confirmation::NearEngulfing);
    }
    if strong_close(side, cur) {
        return Some(Confirmation::StrongClose);
    }
    None
}

fn classical_engulfing(side: Side, prev: &Bar, cur: &Bar) -> bool {
    match side {
        Side::Long => {
            cur.is_bullish()
                && !prev.is_bullish()
                && cur.open <= prev.close
                && cur.close >= prev.open
        }
        Side::Short => {
            !cur.is_bullish()
                && prev.is_bullish()
                && cur.open >= prev.close
                && cur.close <= prev.open
        }
    }
}

/// Same direction requirement as the classical pattern, but the current body
/// only needs to cover `body_overlap_min` of the prior body.
fn near_engulfing(side: Side, prev: &Bar, cur: &Bar, body_overlap_min: f64) -> bool {
    let direction_ok = match side {
        Side::Long => cur.is_bullish() && !prev.is_bullish(),
        Side::Short => !cur.is_bullish() && prev.is_bullish(),
    };
    if !direction_ok {
        return false;
    }
    let prev_body = prev.body();
    if prev_body <= 0.0 {
        return false;
    }
    let (prev_lo, prev_hi) = (prev.open.min(prev.close), prev.open.max(prev.close));
    let (cur_lo, cur_hi) = (cur.open.min(cur.close), cur.open.max(cur.close));
    let overlap = (prev_hi.min(cur_hi) - prev_lo.max(cur_lo)).max(0.0);
    overlap >= body_overlap_min * prev_body
}

/// Close in the favorable half of the bar's range.
fn strong_close(side: Side, cur: &Bar) -> bool {
    let range = cur.range();
    if range <= 0.0 {
        return false;
    }
    match side {
        Side::Long => (cur.close - cur.low) / range >= 0.5,
        Side::Short => (cur.high - cur.close) / range >= 0.5,
    }
}

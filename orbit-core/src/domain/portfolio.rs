//! Portfolio ledger — cash, gross-tracked positions, realized P&L, margin.
//!
//! Ledger operations clamp rather than reject: a buy larger than cash affords
//! is cut down to what fits, a sell larger than the holding is cut to the
//! holding. The executor layers capital constraints on top; the ledger itself
//! only keeps the books.
//!
//! Short accounting: proceeds are credited to cash at entry and margin is
//! debited separately, so NAV values shorts as `(short_cost_basis − px) · qty`
//! (the proceeds already sit in cash — anything else double-counts).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Holdings in a single ticker. Long and short sides are tracked gross:
/// both may be non-zero at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Position {
    pub long_qty: u32,
    pub short_qty: u32,
    /// Weighted-average purchase price of the long side.
    pub long_cost_basis: f64,
    /// Weighted-average sale price of the short side.
    pub short_cost_basis: f64,
    /// Margin currently held against the short side.
    pub short_margin_used: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.long_qty == 0 && self.short_qty == 0
    }
}

/// Realized P&L split by side.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RealizedGains {
    pub long: f64,
    pub short: f64,
}

/// Aggregate ledger state.
///
/// `BTreeMap` keeps iteration (and therefore float summation and
/// serialization) in a fixed order — NAV must come out bit-identical
/// between two runs of the same inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub margin_requirement: f64,
    pub positions: BTreeMap<String, Position>,
    pub realized_gains: BTreeMap<String, RealizedGains>,
    pub total_commission: f64,
}

impl Portfolio {
    pub fn new(initial_capital: f64, margin_requirement: f64) -> Self {
        Self {
            cash: initial_capital,
            initial_capital,
            margin_requirement,
            positions: BTreeMap::new(),
            realized_gains: BTreeMap::new(),
            total_commission: 0.0,
        }
    }

    /// Buy up to `qty` at `px`. Quantity is clamped to `floor(cash / px)`.
    /// Returns the quantity actually applied.
    pub fn buy(&mut self, ticker: &str, qty: u32, px: f64, commission: f64) -> u32 {
        let affordable = if px > 0.0 {
            (self.cash / px).floor().max(0.0) as u32
        } else {
            0
        };
        let qty = qty.min(affordable);
        if qty == 0 {
            return 0;
        }

        let pos = self.positions.entry(ticker.to_string()).or_default();
        let old_qty = pos.long_qty as f64;
        let new_qty = old_qty + qty as f64;
        pos.long_cost_basis = (pos.long_cost_basis * old_qty + px * qty as f64) / new_qty;
        pos.long_qty += qty;

        self.cash -= qty as f64 * px + commission;
        self.total_commission += commission;
        qty
    }

    /// Sell up to `qty` at `px`. Quantity is clamped to the long holding.
    pub fn sell(&mut self, ticker: &str, qty: u32, px: f64, commission: f64) -> u32 {
        let Some(pos) = self.positions.get_mut(ticker) else {
            return 0;
        };
        let qty = qty.min(pos.long_qty);
        if qty == 0 {
            return 0;
        }

        let pnl = (px - pos.long_cost_basis) * qty as f64;
        pos.long_qty -= qty;
        if pos.long_qty == 0 {
            pos.long_cost_basis = 0.0;
        }

        self.cash += qty as f64 * px - commission;
        self.total_commission += commission;
        self.realized_gains
            .entry(ticker.to_string())
            .or_default()
            .long += pnl;
        qty
    }

    /// Short up to `qty` at `px`. Proceeds are credited to cash; margin
    /// (`qty·px·margin_requirement`) and commission are debited. Quantity is
    /// clamped to what cash can margin after commission.
    pub fn short(&mut self, ticker: &str, qty: u32, px: f64, commission: f64) -> u32 {
        let per_unit_margin = px * self.margin_requirement;
        let affordable = if per_unit_margin > 0.0 {
            (((self.cash - commission) / per_unit_margin).floor()).max(0.0) as u32
        } else {
            0
        };
        let qty = qty.min(affordable);
        if qty == 0 {
            return 0;
        }

        let pos = self.positions.entry(ticker.to_string()).or_default();
        let old_qty = pos.short_qty as f64;
        let new_qty = old_qty + qty as f64;
        pos.short_cost_basis = (pos.short_cost_basis * old_qty + px * qty as f64) / new_qty;
        pos.short_qty += qty;

        let margin = qty as f64 * per_unit_margin;
        pos.short_margin_used += margin;
        self.cash += qty as f64 * px;
        self.cash -= margin + commission;
        self.total_commission += commission;
        qty
    }

    /// Cover up to `qty` at `px`. Releases margin proportionally, pays the
    /// cover cost, realizes `(short_cost_basis − px) · qty`.
    pub fn cover(&mut self, ticker: &str, qty: u32, px: f64, commission: f64) -> u32 {
        let Some(pos) = self.positions.get_mut(ticker) else {
            return 0;
        };
        let qty = qty.min(pos.short_qty);
        if qty == 0 {
            return 0;
        }

        let released = pos.short_margin_used * qty as f64 / pos.short_qty as f64;
        let pnl = (pos.short_cost_basis - px) * qty as f64;

        pos.short_qty -= qty;
        pos.short_margin_used -= released;
        if pos.short_qty == 0 {
            pos.short_cost_basis = 0.0;
            pos.short_margin_used = 0.0;
        }

        self.cash += released;
        self.cash -= qty as f64 * px + commission;
        self.total_commission += commission;
        self.realized_gains
            .entry(ticker.to_string())
            .or_default()
            .short += pnl;
        qty
    }

    /// Net asset value at the given marks.
    ///
    /// `NAV = cash + Σ long_qty·px + Σ (short_cost_basis − px)·short_qty`.
    /// The short term is pure P&L: the proceeds are already in cash, so
    /// valuing the short at market would double-count them. Margin held in
    /// `short_margin_used` rejoins cash when the short covers. A ticker
    /// without a mark falls back to its cost basis.
    pub fn nav(&self, prices: &BTreeMap<String, f64>) -> f64 {
        let mut nav = self.cash;
        for (ticker, pos) in &self.positions {
            if pos.long_qty > 0 {
                let px = prices.get(ticker).copied().unwrap_or(pos.long_cost_basis);
                nav += pos.long_qty as f64 * px;
            }
            if pos.short_qty > 0 {
                let px = prices.get(ticker).copied().unwrap_or(pos.short_cost_basis);
                nav += (pos.short_cost_basis - px) * pos.short_qty as f64;
            }
        }
        nav
    }

    /// Gross exposure: absolute sum of long and short position values.
    pub fn gross_exposure(&self, prices: &BTreeMap<String, f64>) -> f64 {
        self.positions
            .iter()
            .map(|(ticker, pos)| {
                let long_px = prices.get(ticker).copied().unwrap_or(pos.long_cost_basis);
                let short_px = prices.get(ticker).copied().unwrap_or(pos.short_cost_basis);
                pos.long_qty as f64 * long_px + pos.short_qty as f64 * short_px
            })
            .sum()
    }

    /// Exposure in a single ticker (absolute, long + short).
    pub fn ticker_exposure(&self, ticker: &str, px: f64) -> f64 {
        match self.positions.get(ticker) {
            Some(pos) => (pos.long_qty + pos.short_qty) as f64 * px,
            None => 0.0,
        }
    }

    pub fn position(&self, ticker: &str) -> Option<&Position> {
        self.positions.get(ticker).filter(|p| !p.is_flat())
    }

    /// Total realized P&L across all tickers and both sides.
    pub fn total_realized(&self) -> f64 {
        self.realized_gains
            .values()
            .map(|g| g.long + g.short)
            .sum()
    }
}

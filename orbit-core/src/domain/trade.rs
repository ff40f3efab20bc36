//! Trade records — the append-only fill log and round-trip extraction.

use crate::domain::active::Side;
use crate::domain::decision::{Action, Confirmation};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Why a fill closed a position (or `None` for entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    Target,
    TimeInvalidation,
    Strategy,
    None,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::Target => "target",
            ExitReason::TimeInvalidation => "time_invalidation",
            ExitReason::Strategy => "strategy",
            ExitReason::None => "none",
        }
    }
}

/// One executed fill. Appended to the trade log and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: NaiveDateTime,
    pub ticker: String,
    pub action: Action,
    pub quantity: u32,
    pub requested_price: f64,
    /// Price after friction (equals `requested_price` for matcher exits —
    /// stops and targets fill exactly at the level).
    pub executed_price: f64,
    pub commission: f64,
    pub slippage_cost: f64,
    /// Realized P&L of this fill (zero for entries).
    pub realized_pnl: f64,
    pub exit_reason: ExitReason,
    pub confirmation: Option<Confirmation>,
}

/// A completed entry→exit pair, assembled by the engine when a position
/// closes. This is what the per-trade CSV and the per-trade metrics consume;
/// the flat fill log stays reconstructable via `(ticker, entry_timestamp)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundTrip {
    pub ticker: String,
    pub side: Side,
    pub quantity: u32,
    pub entry_timestamp: NaiveDateTime,
    pub exit_timestamp: NaiveDateTime,
    pub requested_entry_price: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub bars_held: u32,
    pub mfe_r: f64,
    pub mae_r: f64,
    /// Signed P&L per contract over initial risk, both prices as requested.
    pub r_multiple: f64,
    /// Same, with the friction-adjusted entry fill.
    pub r_multiple_after_friction: f64,
    pub gross_pnl: f64,
    /// Gross P&L minus the commissions of both fills.
    pub net_pnl: f64,
    pub commission: f64,
    pub exit_reason: ExitReason,
    pub confirmation: Option<Confirmation>,
}

impl RoundTrip {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > 0.0
    }
}

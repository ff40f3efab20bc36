//! ActivePosition — the bracket the matcher enforces while a trade is open.

use crate::domain::decision::Confirmation;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }
}

/// One open bracket per ticker: entry, stop, target, and running excursion
/// statistics. Created by the executor on entry, mutated by the matcher,
/// destroyed on exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivePosition {
    pub side: Side,
    pub quantity: u32,
    /// Friction-adjusted fill price.
    pub entry_price: f64,
    /// Price the strategy asked for, before friction. Kept for the
    /// pre-friction r-multiple variant.
    pub requested_entry_price: f64,
    pub stop_loss: f64,
    pub target: f64,
    pub entry_timestamp: NaiveDateTime,
    pub bars_since_entry: u32,
    /// Maximum favorable excursion, in price units (≥ 0).
    pub mfe: f64,
    /// Maximum adverse excursion, in price units (≤ 0).
    pub mae: f64,
    pub confirmation: Option<Confirmation>,
}

impl ActivePosition {
    /// Initial risk per contract. Construction requires `stop ≠ entry`, so
    /// this is never zero.
    pub fn r_risk(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }

    pub fn mfe_r(&self) -> f64 {
        self.mfe / self.r_risk()
    }

    pub fn mae_r(&self) -> f64 {
        self.mae / self.r_risk()
    }

    /// Fold a bar's high/low into the excursion stats. Favorable excursion
    /// comes from the bar extreme in the position's direction, adverse from
    /// the extreme against it.
    pub fn update_excursions(&mut self, high: f64, low: f64) {
        let (favorable, adverse) = match self.side {
            Side::Long => (high - self.entry_price, low - self.entry_price),
            Side::Short => (self.entry_price - low, self.entry_price - high),
        };
        if favorable > self.mfe {
            self.mfe = favorable;
        }
        if adverse < self.mae {
            self.mae = adverse;
        }
    }
}

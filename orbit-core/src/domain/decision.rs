//! Decision — the tagged record a strategy hands back to the engine.
//!
//! Upstream systems exchange loosely-typed maps; inside the engine a decision
//! is a validated record. Shape validation happens once, at the executor
//! boundary. Decisions are immutable after construction.

use crate::error::ContractError;
use serde::{Deserialize, Serialize};

/// What the strategy wants done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    Short,
    Cover,
    Hold,
}

impl Action {
    /// Actions that open a new ActivePosition.
    pub fn is_entry(self) -> bool {
        matches!(self, Action::Buy | Action::Short)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Short => "short",
            Action::Cover => "cover",
            Action::Hold => "hold",
        }
    }
}

/// Which confirmation pattern validated a pullback entry.
///
/// A first-class field rather than a substring of the reasoning text, so
/// downstream analysis never regex-parses free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    Engulfing,
    NearEngulfing,
    StrongClose,
}

/// A validated strategy decision. The engine never mutates one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub quantity: u32,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    /// 0..=100.
    pub confidence: u8,
    pub reasoning: String,
    pub confirmation: Option<Confirmation>,
}

impl Decision {
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            quantity: 0,
            stop_loss: None,
            target: None,
            confidence: 0,
            reasoning: reasoning.into(),
            confirmation: None,
        }
    }

    /// Shape validation. `entry_price` is the price the fill would request,
    /// needed to reject a stop placed exactly at the entry.
    pub fn validate(&self, entry_price: f64) -> Result<(), ContractError> {
        if self.confidence > 100 {
            return Err(ContractError::ConfidenceOutOfRange(self.confidence));
        }
        match self.action {
            Action::Hold => {
                if self.quantity != 0 {
                    return Err(ContractError::NonZeroHold(self.quantity));
                }
            }
            action => {
                if self.quantity == 0 {
                    return Err(ContractError::QuantityMismatch {
                        action: action.as_str().into(),
                        quantity: 0,
                    });
                }
            }
        }
        if self.action.is_entry() {
            let stop = self
                .stop_loss
                .ok_or_else(|| ContractError::MissingStop(self.action.as_str().into()))?;
            let target = self
                .target
                .ok_or_else(|| ContractError::MissingTarget(self.action.as_str().into()))?;
            if !stop.is_finite() {
                return Err(ContractError::NonFinitePrice(stop));
            }
            if !target.is_finite() {
                return Err(ContractError::NonFinitePrice(target));
            }
            if stop == entry_price {
                return Err(ContractError::DegenerateStop(stop));
            }
        }
        Ok(())
    }
}

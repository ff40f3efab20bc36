//! Error taxonomy for the engine.
//!
//! Three severities, per the failure policy:
//! - `EngineError` — invariant breach. Unwinds the bar loop; the runner still
//!   prints a partial summary and the determinism hash before exiting non-zero.
//! - `StrategyError` — a fault inside a strategy's `generate`. Caught at the
//!   call site only, logged, coerced to hold.
//! - `DataIntegrityError` / `ContractError` — specific kinds that escalate to
//!   `EngineError` depending on where they originate.

use chrono::NaiveDateTime;
use thiserror::Error;

/// Bad input data discovered at load time or by the duplicate-bar guard.
#[derive(Debug, Clone, Error)]
pub enum DataIntegrityError {
    #[error("{ticker} {timestamp}: {detail}")]
    BadBar {
        ticker: String,
        timestamp: NaiveDateTime,
        detail: String,
    },

    #[error("duplicate bar ({ticker}, {timestamp})")]
    DuplicateBar {
        ticker: String,
        timestamp: NaiveDateTime,
    },

    #[error("ticker '{0}' has no CSV file in the data directory")]
    MissingTicker(String),

    #[error("no bars in range {start}..={end} for ticker '{ticker}'")]
    EmptyRange {
        ticker: String,
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("{path}: {detail}")]
    Malformed { path: String, detail: String },
}

/// An invalid decision shape, caught before any ledger mutation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContractError {
    #[error("action {action} requires quantity > 0, got {quantity}")]
    QuantityMismatch { action: String, quantity: u32 },

    #[error("hold decision must carry quantity 0, got {0}")]
    NonZeroHold(u32),

    #[error("confidence {0} outside 0..=100")]
    ConfidenceOutOfRange(u8),

    #[error("entry action {0} missing stop_loss")]
    MissingStop(String),

    #[error("entry action {0} missing target")]
    MissingTarget(String),

    #[error("stop_loss equals entry price {0}")]
    DegenerateStop(f64),

    #[error("price {0} is not finite")]
    NonFinitePrice(f64),
}

/// A fault inside a strategy. Never aborts the run.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("invalid decision: {0}")]
    Contract(#[from] ContractError),

    #[error("{0}")]
    Internal(String),
}

/// Attempted access to a bar the strategy is not yet allowed to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("lookahead: requested bar {requested} but view is limited to {limit}")]
pub struct LookaheadError {
    pub requested: usize,
    pub limit: usize,
}

/// Invariant breach: the run aborts.
///
/// Every variant raised from inside the loop carries the iteration index,
/// bar timestamp and ticker so diagnostics can locate the exact bar.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data integrity: {0}")]
    Data(#[from] DataIntegrityError),

    #[error("engine failure at [{index}] {ticker} {timestamp}: {detail}")]
    Failure {
        index: usize,
        ticker: String,
        timestamp: NaiveDateTime,
        detail: String,
    },

    /// A contract violation on a synthesized (engine-internal) exit. The same
    /// shape from a strategy is a `StrategyError` instead.
    #[error("internal contract violation at [{index}] {ticker} {timestamp}: {source}")]
    InternalContract {
        index: usize,
        ticker: String,
        timestamp: NaiveDateTime,
        #[source]
        source: ContractError,
    },

    #[error("determinism violation: {0}")]
    Determinism(String),
}

impl EngineError {
    pub fn failure(
        index: usize,
        ticker: impl Into<String>,
        timestamp: NaiveDateTime,
        detail: impl Into<String>,
    ) -> Self {
        Self::Failure {
            index,
            ticker: ticker.into(),
            timestamp,
            detail: detail.into(),
        }
    }
}

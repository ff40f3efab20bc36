//! orbit-core — deterministic intraday backtest engine.
//!
//! Replays an ordered stream of OHLCV bars against a pluggable strategy,
//! keeps a portfolio ledger with intrabar stop/target execution, and emits a
//! reproducible, hash-verifiable record of every decision and trade. Single
//! threaded by contract: one engine owns all mutable state, and two runs
//! over the same inputs are byte-identical.

pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod rng;
pub mod strategy;
pub mod view;

pub use config::{ConfigError, EngineConfig};
pub use data::{load_dataset, Dataset};
pub use engine::{DailyNav, Engine, Observer};
pub use error::{ContractError, DataIntegrityError, EngineError, LookaheadError, StrategyError};
pub use strategy::{OrbParams, OrbStrategy, PortfolioSnapshot, Strategy};
pub use view::PriceView;

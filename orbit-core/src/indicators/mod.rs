//! Indicators used by the reference strategy.

pub mod atr;

pub use atr::{median, true_range, wilder_atr};

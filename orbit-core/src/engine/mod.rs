//! Engine internals: executor, matcher, observer, and the bar loop.

pub mod executor;
pub mod loop_runner;
pub mod matcher;
pub mod observer;

pub use executor::{BlockReason, ExecError, ExecOutcome, Executor};
pub use loop_runner::{DailyNav, Engine};
pub use matcher::{MatchedExit, Matcher};
pub use observer::Observer;

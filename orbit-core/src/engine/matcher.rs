//! Intrabar matcher — stop, target and time-invalidation checks.
//!
//! Runs against every open bracket before the strategy sees the bar. Fill
//! ordering inside a single bar is fixed at worst case: when a bar's range
//! covers both levels, the stop matches before the target. Stops and targets
//! fill exactly at their level; time invalidation fills at the close.

use crate::domain::{ActivePosition, Bar, ExitReason, Side};

/// A matched exit: where the position leaves and why.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedExit {
    pub price: f64,
    pub reason: ExitReason,
}

#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    pub time_invalidation_bars: u32,
    pub time_invalidation_mfe_r: f64,
}

impl Matcher {
    /// Examine one bar for an open bracket. Mutates the bracket's excursion
    /// stats and bar counter when the position survives the level checks.
    ///
    /// Order: stop, then target, then excursion update, then time check.
    pub fn check(&self, pos: &mut ActivePosition, bar: &Bar) -> Option<MatchedExit> {
        match pos.side {
            Side::Long => {
                if bar.low <= pos.stop_loss {
                    return Some(MatchedExit {
                        price: pos.stop_loss,
                        reason: ExitReason::StopLoss,
                    });
                }
                if bar.high >= pos.target {
                    return Some(MatchedExit {
                        price: pos.target,
                        reason: ExitReason::Target,
                    });
                }
            }
            Side::Short => {
                if bar.high >= pos.stop_loss {
                    return Some(MatchedExit {
                        price: pos.stop_loss,
                        reason: ExitReason::StopLoss,
                    });
                }
                if bar.low <= pos.target {
                    return Some(MatchedExit {
                        price: pos.target,
                        reason: ExitReason::Target,
                    });
                }
            }
        }

        pos.update_excursions(bar.high, bar.low);
        pos.bars_since_entry += 1;

        if pos.bars_since_entry >= self.time_invalidation_bars
            && pos.mfe_r() < self.time_invalidation_mfe_r
        {
            return Some(MatchedExit {
                price: bar.close,
                reason: ExitReason::TimeInvalidation,
            });
        }
        None
    }

    /// Same-bar stop check immediately after an entry — there is no one-bar
    /// grace period. Only the stop is tested on the entry bar.
    pub fn check_entry_bar(&self, pos: &ActivePosition, bar: &Bar) -> Option<MatchedExit> {
        let stopped = match pos.side {
            Side::Long => bar.low <= pos.stop_loss,
            Side::Short => bar.high >= pos.stop_loss,
        };
        stopped.then_some(MatchedExit {
            price: pos.stop_loss,
            reason: ExitReason::StopLoss,
        })
    }
}

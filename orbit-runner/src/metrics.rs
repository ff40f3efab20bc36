//! Performance metrics — pure functions over the daily NAV series and the
//! round-trip log.
//!
//! Statistics that are undefined for the inputs (Sharpe with zero variance,
//! profit factor with no losses, expectancy with no trades) are `None` and
//! serialize as absent — never as a fake zero.

use orbit_core::domain::RoundTrip;
use orbit_core::DailyNav;
use serde::{Deserialize, Serialize};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_return: f64,
    pub trade_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expectancy: Option<f64>,
    pub max_drawdown: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_recovery_days: Option<usize>,
    pub longest_losing_streak: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpe: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sortino: Option<f64>,
}

impl SummaryMetrics {
    pub fn compute(
        daily: &[DailyNav],
        round_trips: &[RoundTrip],
        initial_capital: f64,
        final_nav: f64,
    ) -> Self {
        let returns = daily_returns(daily);
        Self {
            total_return: final_nav / initial_capital - 1.0,
            trade_count: round_trips.len(),
            win_rate: win_rate(round_trips),
            profit_factor: profit_factor(round_trips),
            expectancy: expectancy(round_trips),
            max_drawdown: max_drawdown(daily, initial_capital),
            time_to_recovery_days: time_to_recovery(daily, initial_capital),
            longest_losing_streak: longest_losing_streak(round_trips),
            sharpe: sharpe(&returns),
            sortino: sortino(&returns),
        }
    }
}

/// Day-over-day NAV returns: `NAV_t / NAV_{t-1} − 1`.
pub fn daily_returns(daily: &[DailyNav]) -> Vec<f64> {
    daily
        .windows(2)
        .map(|w| w[1].nav / w[0].nav - 1.0)
        .collect()
}

/// Fraction of closed trades with positive net P&L. `None` without trades.
pub fn win_rate(round_trips: &[RoundTrip]) -> Option<f64> {
    if round_trips.is_empty() {
        return None;
    }
    let winners = round_trips.iter().filter(|t| t.is_winner()).count();
    Some(winners as f64 / round_trips.len() as f64)
}

/// Gross gains over absolute gross losses. `None` without losses (the ratio
/// is unbounded, not 0).
pub fn profit_factor(round_trips: &[RoundTrip]) -> Option<f64> {
    let gains: f64 = round_trips
        .iter()
        .filter(|t| t.net_pnl > 0.0)
        .map(|t| t.net_pnl)
        .sum();
    let losses: f64 = round_trips
        .iter()
        .filter(|t| t.net_pnl < 0.0)
        .map(|t| t.net_pnl.abs())
        .sum();
    (losses > 0.0).then(|| gains / losses)
}

/// Mean net P&L per closed trade. `None` without trades.
pub fn expectancy(round_trips: &[RoundTrip]) -> Option<f64> {
    if round_trips.is_empty() {
        return None;
    }
    Some(round_trips.iter().map(|t| t.net_pnl).sum::<f64>() / round_trips.len() as f64)
}

/// Worst `NAV_t / running_max − 1` over the daily series, peak seeded with
/// the initial capital. 0.0 for a series that never draws down.
pub fn max_drawdown(daily: &[DailyNav], initial_capital: f64) -> f64 {
    let mut peak = initial_capital;
    let mut worst = 0.0_f64;
    for point in daily {
        if point.nav > peak {
            peak = point.nav;
        }
        if peak > 0.0 {
            let dd = point.nav / peak - 1.0;
            if dd < worst {
                worst = dd;
            }
        }
    }
    worst
}

/// Days from the max-drawdown trough until NAV reclaims the prior peak.
/// `None` when there is no drawdown or the peak is never reclaimed.
pub fn time_to_recovery(daily: &[DailyNav], initial_capital: f64) -> Option<usize> {
    let mut peak = initial_capital;
    let mut worst = 0.0_f64;
    let mut trough_index = None;
    let mut trough_peak = initial_capital;

    for (i, point) in daily.iter().enumerate() {
        if point.nav > peak {
            peak = point.nav;
        }
        if peak > 0.0 {
            let dd = point.nav / peak - 1.0;
            if dd < worst {
                worst = dd;
                trough_index = Some(i);
                trough_peak = peak;
            }
        }
    }

    let trough = trough_index?;
    daily[trough..].iter().position(|p| p.nav >= trough_peak)
}

/// Longest run of consecutive losing trades (net P&L < 0), in entry order.
pub fn longest_losing_streak(round_trips: &[RoundTrip]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for trade in round_trips {
        if trade.net_pnl < 0.0 {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Annualized Sharpe: `mean / std · √252` over daily returns. `None` with
/// fewer than two returns or zero variance.
pub fn sharpe(returns: &[f64]) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let mean = mean(returns);
    let std = std_dev(returns, mean);
    (std > 1e-15).then(|| mean / std * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Sortino: like Sharpe, with only negative returns in the deviation.
/// `None` without any negative return.
pub fn sortino(returns: &[f64]) -> Option<f64> {
    if returns.len() < 2 {
        return None;
    }
    let mean_all = mean(returns);
    let downside_sq: f64 = returns.iter().filter(|&&r| r < 0.0).map(|r| r * r).sum();
    if downside_sq == 0.0 {
        return None;
    }
    let downside_std = (downside_sq / returns.len() as f64).sqrt();
    (downside_std > 1e-15).then(|| mean_all / downside_std * TRADING_DAYS_PER_YEAR.sqrt())
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn std_dev(xs: &[f64], mean: f64) -> f64 {
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use orbit_core::domain::{ExitReason, Side};

    fn nav_series(values: &[f64]) -> Vec<DailyNav> {
        values
            .iter()
            .enumerate()
            .map(|(i, &nav)| DailyNav {
                date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                nav,
            })
            .collect()
    }

    fn trade(net_pnl: f64) -> RoundTrip {
        let ts = NaiveDate::from_ymd_opt(2025, 9, 23)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        RoundTrip {
            ticker: "ES".into(),
            side: Side::Long,
            quantity: 1,
            entry_timestamp: ts,
            exit_timestamp: ts,
            requested_entry_price: 100.0,
            entry_price: 100.0,
            exit_price: 100.0 + net_pnl,
            bars_held: 3,
            mfe_r: 0.5,
            mae_r: -0.5,
            r_multiple: net_pnl,
            r_multiple_after_friction: net_pnl,
            gross_pnl: net_pnl,
            net_pnl,
            commission: 4.0,
            exit_reason: ExitReason::Strategy,
            confirmation: None,
        }
    }

    #[test]
    fn daily_returns_basic() {
        let daily = nav_series(&[100.0, 110.0, 99.0]);
        let returns = daily_returns(&daily);
        assert!((returns[0] - 0.1).abs() < 1e-12);
        assert!((returns[1] + 0.1).abs() < 1e-12);
    }

    #[test]
    fn win_rate_none_without_trades() {
        assert_eq!(win_rate(&[]), None);
        assert_eq!(win_rate(&[trade(5.0), trade(-3.0)]), Some(0.5));
    }

    #[test]
    fn profit_factor_none_without_losses() {
        assert_eq!(profit_factor(&[trade(5.0)]), None);
        let pf = profit_factor(&[trade(6.0), trade(-3.0)]).unwrap();
        assert!((pf - 2.0).abs() < 1e-12);
    }

    #[test]
    fn expectancy_is_mean_net_pnl() {
        assert_eq!(expectancy(&[]), None);
        assert!((expectancy(&[trade(6.0), trade(-2.0)]).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_from_peak() {
        let daily = nav_series(&[110.0, 120.0, 90.0, 100.0]);
        // Peak 120 → trough 90: −25%.
        assert!((max_drawdown(&daily, 100.0) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn max_drawdown_zero_when_monotonic() {
        let daily = nav_series(&[100.0, 105.0, 110.0]);
        assert_eq!(max_drawdown(&daily, 100.0), 0.0);
    }

    #[test]
    fn drawdown_measured_from_initial_capital() {
        // First day already below the starting capital.
        let daily = nav_series(&[95.0, 97.0]);
        assert!((max_drawdown(&daily, 100.0) + 0.05).abs() < 1e-12);
    }

    #[test]
    fn time_to_recovery_counts_days_from_trough() {
        let daily = nav_series(&[110.0, 90.0, 100.0, 111.0]);
        // Trough at index 1, peak 110 reclaimed at index 3 → 2 days.
        assert_eq!(time_to_recovery(&daily, 100.0), Some(2));
    }

    #[test]
    fn time_to_recovery_none_when_unrecovered() {
        let daily = nav_series(&[110.0, 90.0, 95.0]);
        assert_eq!(time_to_recovery(&daily, 100.0), None);
    }

    #[test]
    fn losing_streak_counts_consecutive_losses() {
        let trades = vec![trade(-1.0), trade(-1.0), trade(2.0), trade(-1.0)];
        assert_eq!(longest_losing_streak(&trades), 2);
        assert_eq!(longest_losing_streak(&[]), 0);
    }

    #[test]
    fn sharpe_none_for_constant_returns() {
        assert_eq!(sharpe(&[0.01, 0.01, 0.01]), None);
        assert!(sharpe(&[0.01, -0.02, 0.03]).is_some());
    }

    #[test]
    fn sortino_none_without_downside() {
        assert_eq!(sortino(&[0.01, 0.02, 0.005]), None);
        assert!(sortino(&[0.01, -0.02, 0.03]).unwrap().is_finite());
    }

    #[test]
    fn undefined_metrics_serialize_as_absent() {
        let metrics = SummaryMetrics::compute(&nav_series(&[100_000.0]), &[], 100_000.0, 100_000.0);
        let json = serde_json::to_value(&metrics).unwrap();
        assert!(json.get("sharpe").is_none());
        assert!(json.get("win_rate").is_none());
        assert!(json.get("profit_factor").is_none());
        assert_eq!(json["trade_count"], 0);
        assert_eq!(json["total_return"], 0.0);
    }
}

//! Run artifacts: per-trade CSV, daily NAV CSV, summary JSON.

use crate::result::RunSummary;
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use orbit_core::domain::RoundTrip;
use orbit_core::DailyNav;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Full ISO timestamp in the dataset's timezone. A wall-clock instant made
/// ambiguous by a DST fold renders at its earliest offset.
fn format_iso(ts: NaiveDateTime, tz: Tz) -> String {
    match tz.from_local_datetime(&ts).earliest() {
        Some(zoned) => zoned.format("%Y-%m-%dT%H:%M:%S%z").to_string(),
        None => ts.format("%Y-%m-%dT%H:%M:%S").to_string(),
    }
}

pub fn write_trades_csv(path: &Path, round_trips: &[RoundTrip], tz: Tz) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to create trades CSV {}", path.display()))?;

    writeln!(
        file,
        "ticker,side,entry_timestamp,exit_timestamp,quantity,requested_entry_price,\
         entry_price,exit_price,bars_held,mfe_r,mae_r,r_multiple,r_multiple_after_friction,\
         gross_pnl,net_pnl,commission,exit_reason,confirmation"
    )?;

    for trade in round_trips {
        let confirmation = trade
            .confirmation
            .map(|c| serde_json::to_value(c).expect("confirmation serializes"))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        writeln!(
            file,
            "{},{},{},{},{},{:.4},{:.4},{:.4},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{},{}",
            trade.ticker,
            trade.side.as_str(),
            format_iso(trade.entry_timestamp, tz),
            format_iso(trade.exit_timestamp, tz),
            trade.quantity,
            trade.requested_entry_price,
            trade.entry_price,
            trade.exit_price,
            trade.bars_held,
            trade.mfe_r,
            trade.mae_r,
            trade.r_multiple,
            trade.r_multiple_after_friction,
            trade.gross_pnl,
            trade.net_pnl,
            trade.commission,
            trade.exit_reason.as_str(),
            confirmation,
        )?;
    }

    Ok(())
}

pub fn write_nav_csv(path: &Path, daily: &[DailyNav]) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("failed to create NAV CSV {}", path.display()))?;

    writeln!(file, "date,nav,daily_return")?;
    let mut prev: Option<f64> = None;
    for point in daily {
        match prev {
            Some(p) if p > 0.0 => writeln!(
                file,
                "{},{:.4},{:.8}",
                point.date,
                point.nav,
                point.nav / p - 1.0
            )?,
            _ => writeln!(file, "{},{:.4},", point.date, point.nav)?,
        }
        prev = Some(point.nav);
    }

    Ok(())
}

pub fn write_summary_json(path: &Path, summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("failed to serialize summary")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write summary {}", path.display()))?;
    Ok(())
}

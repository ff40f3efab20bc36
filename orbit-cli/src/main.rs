//! `engine` — run a backtest from the command line.
//!
//! Exit codes: 0 on completion, 1 on engine failure (a partial summary and
//! the determinism hash still print), 2 on bad configuration.
//!
//! `ENGINE_DETERMINISTIC=1` asserts that the run performs no wall-clock or
//! network access; any such access raises a determinism violation.

use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::Parser;
use orbit_core::{ConfigError, EngineConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "engine", about = "Deterministic intraday backtest engine")]
struct Cli {
    /// TOML run configuration; CLI flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of per-ticker CSV files (`<TICKER>.csv`).
    #[arg(long)]
    data_dir: PathBuf,

    /// Comma-separated instruments to trade.
    #[arg(long, value_delimiter = ',')]
    tickers: Option<Vec<String>>,

    /// Inclusive ISO start date.
    #[arg(long)]
    start_date: Option<NaiveDate>,

    /// Inclusive ISO end date.
    #[arg(long)]
    end_date: Option<NaiveDate>,

    #[arg(long)]
    initial_capital: Option<f64>,

    #[arg(long)]
    slippage_bps: Option<f64>,

    #[arg(long)]
    spread_bps: Option<f64>,

    /// Commission per executed fill.
    #[arg(long)]
    commission: Option<f64>,

    #[arg(long)]
    margin_requirement: Option<f64>,

    /// Dataset timezone (IANA name, e.g. America/New_York).
    #[arg(long)]
    timezone: Option<Tz>,

    /// Enable per-bar JSON snapshots into this directory.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,

    /// Fail with a determinism violation unless the final hash matches.
    #[arg(long)]
    verify_hash: Option<String>,

    /// Directory for trades.csv, nav.csv and summary.json.
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,
}

fn build_config(cli: &Cli) -> Result<EngineConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
            EngineConfig::from_toml(&text)?
        }
        None => {
            let missing = |name: &str| ConfigError::Parse(format!("--{name} is required"));
            EngineConfig {
                initial_capital: cli.initial_capital.ok_or_else(|| missing("initial-capital"))?,
                tickers: cli.tickers.clone().ok_or_else(|| missing("tickers"))?,
                start_date: cli.start_date.ok_or_else(|| missing("start-date"))?,
                end_date: cli.end_date.ok_or_else(|| missing("end-date"))?,
                margin_requirement: 0.5,
                commission_per_trade: 0.0,
                slippage_bps: 0.0,
                spread_bps: 0.0,
                trading_window_start: chrono::NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                trading_window_end: chrono::NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
                opening_range_minutes: 15,
                risk_per_trade_pct: 0.0025,
                time_invalidation_bars: 5,
                time_invalidation_mfe_r: 0.5,
                timezone: chrono_tz::America::New_York,
                snapshot_dir: None,
                seed: 42,
                expected_hash: None,
                strict_determinism: false,
            }
        }
    };

    // CLI flags win over the file.
    if let Some(capital) = cli.initial_capital {
        config.initial_capital = capital;
    }
    if let Some(tickers) = &cli.tickers {
        config.tickers = tickers.clone();
    }
    if let Some(date) = cli.start_date {
        config.start_date = date;
    }
    if let Some(date) = cli.end_date {
        config.end_date = date;
    }
    if let Some(bps) = cli.slippage_bps {
        config.slippage_bps = bps;
    }
    if let Some(bps) = cli.spread_bps {
        config.spread_bps = bps;
    }
    if let Some(commission) = cli.commission {
        config.commission_per_trade = commission;
    }
    if let Some(margin) = cli.margin_requirement {
        config.margin_requirement = margin;
    }
    if let Some(tz) = cli.timezone {
        config.timezone = tz;
    }
    if let Some(dir) = &cli.snapshot_dir {
        config.snapshot_dir = Some(dir.clone());
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(hash) = &cli.verify_hash {
        config.expected_hash = Some(hash.clone());
    }
    config.strict_determinism = std::env::var("ENGINE_DETERMINISTIC").as_deref() == Ok("1");

    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    match orbit_runner::run_backtest(&config, &cli.data_dir, Some(&cli.out_dir)) {
        Ok(outcome) => {
            print!("{}", outcome.summary.render());
            if outcome.engine_failed {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("engine error: {e:#}");
            ExitCode::from(1)
        }
    }
}

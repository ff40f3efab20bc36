//! Backtest runner — wires together data loading, the engine, metrics and
//! artifacts.
//!
//! The runner always produces a `RunSummary`, aborted runs included: the
//! engine keeps its partial trade log, NAV series and hash chain, and the
//! summary records the failure alongside them.

use crate::artifacts::{write_nav_csv, write_summary_json, write_trades_csv};
use crate::metrics::SummaryMetrics;
use crate::result::{RunSummary, SCHEMA_VERSION};
use anyhow::{Context, Result};
use orbit_core::engine::Observer;
use orbit_core::strategy::OrbStrategy;
use orbit_core::{load_dataset, Engine, EngineConfig, Strategy};
use std::path::Path;
use tracing::{error, info};

/// Result of a complete runner invocation. `engine_failed` drives the
/// process exit code; the summary is present either way.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub engine_failed: bool,
}

/// Load data, run the reference ORB strategy over it, compute metrics and
/// (optionally) write artifacts into `out_dir`.
pub fn run_backtest(
    config: &EngineConfig,
    data_dir: &Path,
    out_dir: Option<&Path>,
) -> Result<RunOutcome> {
    let mut strategy = OrbStrategy::from_config(config);
    run_backtest_with_strategy(config, data_dir, out_dir, &mut strategy)
}

/// Same, with a caller-supplied strategy.
pub fn run_backtest_with_strategy(
    config: &EngineConfig,
    data_dir: &Path,
    out_dir: Option<&Path>,
    strategy: &mut dyn Strategy,
) -> Result<RunOutcome> {
    config.validate().context("invalid configuration")?;

    let dataset = load_dataset(data_dir, config).context("failed to load bar data")?;
    info!(
        bars = dataset.len(),
        tickers = config.tickers.len(),
        dataset_hash = dataset.hash(),
        "dataset loaded"
    );

    let observer = Observer::stderr(config.snapshot_dir.clone());
    let mut engine = Engine::with_observer(config.clone(), &dataset, observer);
    let run_result = engine.run(strategy);

    let engine_error = match &run_result {
        Ok(()) => None,
        Err(e) => {
            error!(error = %e, "engine failure; emitting partial summary");
            Some(e.to_string())
        }
    };

    let final_nav = engine.final_nav();
    let metrics = SummaryMetrics::compute(
        engine.daily_nav(),
        engine.round_trips(),
        config.initial_capital,
        final_nav,
    );
    let summary = RunSummary {
        schema_version: SCHEMA_VERSION,
        metrics,
        determinism_hash: engine.determinism_hash(),
        dataset_hash: dataset.hash().to_string(),
        config_hash: config.config_hash(),
        config: config.clone(),
        initial_capital: config.initial_capital,
        final_nav,
        bars_processed: engine.bars_processed(),
        strategy_failures: engine.strategy_failures(),
        engine_error,
    };

    if let Some(dir) = out_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output dir {}", dir.display()))?;
        write_trades_csv(&dir.join("trades.csv"), engine.round_trips(), config.timezone)?;
        write_nav_csv(&dir.join("nav.csv"), engine.daily_nav())?;
        write_summary_json(&dir.join("summary.json"), &summary)?;
        info!(out_dir = %dir.display(), "artifacts written");
    }

    Ok(RunOutcome {
        engine_failed: summary.engine_error.is_some(),
        summary,
    })
}

//! Run summary — everything a host needs to interpret or reproduce a run.

use crate::metrics::SummaryMetrics;
use orbit_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Current schema version for persisted summaries.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// The summary printed at the end of every run — including aborted ones,
/// which carry the engine error and the hash over the bars processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub metrics: SummaryMetrics,
    pub determinism_hash: String,
    pub dataset_hash: String,
    pub config_hash: String,
    pub config: EngineConfig,
    pub initial_capital: f64,
    pub final_nav: f64,
    pub bars_processed: usize,
    pub strategy_failures: usize,
    /// Present when the run aborted on an engine failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_error: Option<String>,
}

impl RunSummary {
    /// Human-readable rendering for stdout.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let fmt_opt = |v: Option<f64>| match v {
            Some(v) => format!("{v:.4}"),
            None => "n/a".to_string(),
        };

        out.push_str("── Run summary ──\n");
        if let Some(err) = &self.engine_error {
            out.push_str(&format!("status:            ABORTED ({err})\n"));
        } else {
            out.push_str("status:            completed\n");
        }
        out.push_str(&format!("bars processed:    {}\n", self.bars_processed));
        out.push_str(&format!("initial capital:   {:.2}\n", self.initial_capital));
        out.push_str(&format!("final NAV:         {:.2}\n", self.final_nav));
        out.push_str(&format!(
            "total return:      {:.4}%\n",
            self.metrics.total_return * 100.0
        ));
        out.push_str(&format!("trades:            {}\n", self.metrics.trade_count));
        out.push_str(&format!(
            "win rate:          {}\n",
            fmt_opt(self.metrics.win_rate)
        ));
        out.push_str(&format!(
            "profit factor:     {}\n",
            fmt_opt(self.metrics.profit_factor)
        ));
        out.push_str(&format!(
            "expectancy:        {}\n",
            fmt_opt(self.metrics.expectancy)
        ));
        out.push_str(&format!(
            "max drawdown:      {:.4}%\n",
            self.metrics.max_drawdown * 100.0
        ));
        out.push_str(&format!("sharpe:            {}\n", fmt_opt(self.metrics.sharpe)));
        out.push_str(&format!(
            "sortino:           {}\n",
            fmt_opt(self.metrics.sortino)
        ));
        out.push_str(&format!(
            "strategy failures: {}\n",
            self.strategy_failures
        ));
        out.push_str(&format!("determinism hash:  {}\n", self.determinism_hash));
        out
    }
}

//! Observer — invariant log, snapshots, and the determinism hash chain.
//!
//! Exactly one log line per loop iteration, flushed immediately; the loop
//! asserts the line count equals the bar count after every iteration. The
//! hash chain folds a canonical per-bar digest:
//!
//! `h_i = blake3(ticker ‖ timestamp ‖ round(NAV, 4) ‖ trades_today)`
//! `H_final = blake3(h_0 ‖ h_1 ‖ … ‖ h_{n−1})`
//!
//! No wall clock enters the chain or the log — the Δt column is the bar
//! timestamp delta, so two replays of the same data are byte-identical.

use crate::domain::{Bar, Portfolio};
use crate::error::EngineError;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

/// Per-bar snapshot written when a snapshot directory is configured.
/// Advisory only — the engine never reads these back.
#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    index: usize,
    timestamp: NaiveDateTime,
    portfolio: &'a Portfolio,
    trade_count: usize,
}

pub struct Observer {
    sink: Box<dyn Write + Send>,
    snapshot_dir: Option<PathBuf>,
    lines_emitted: usize,
    chain: blake3::Hasher,
    last_timestamp: Option<NaiveDateTime>,
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("snapshot_dir", &self.snapshot_dir)
            .field("lines_emitted", &self.lines_emitted)
            .finish()
    }
}

impl Observer {
    /// Observer writing to stderr (the diagnostic stream of a normal run).
    pub fn stderr(snapshot_dir: Option<PathBuf>) -> Self {
        Self::with_sink(Box::new(std::io::stderr()), snapshot_dir)
    }

    /// Observer with an injected sink, for tests and hosts that capture the
    /// invariant stream.
    pub fn with_sink(sink: Box<dyn Write + Send>, snapshot_dir: Option<PathBuf>) -> Self {
        Self {
            sink,
            snapshot_dir,
            lines_emitted: 0,
            chain: blake3::Hasher::new(),
            last_timestamp: None,
        }
    }

    /// Record one iteration: log line, hash-chain link, optional snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &mut self,
        index: usize,
        bar: &Bar,
        nav: f64,
        active_positions: usize,
        trades_today: u32,
        portfolio: &Portfolio,
        trade_count: usize,
    ) -> Result<(), EngineError> {
        let io_fail = |what: &str, e: std::io::Error| {
            EngineError::failure(index, bar.ticker.clone(), bar.timestamp, format!("{what}: {e}"))
        };

        let dt_seconds = match self.last_timestamp {
            Some(prev) => (bar.timestamp - prev).num_seconds(),
            None => 0,
        };
        self.last_timestamp = Some(bar.timestamp);

        writeln!(
            self.sink,
            "[{index}] {} | NAV=${nav:.4} | active_positions={active_positions} | \u{0394}t={dt_seconds}s",
            bar.timestamp
        )
        .map_err(|e| io_fail("observer write", e))?;
        self.sink.flush().map_err(|e| io_fail("observer flush", e))?;

        let digest = format!(
            "{}|{}|{:.4}|{trades_today}",
            bar.ticker, bar.timestamp, nav
        );
        let link = blake3::hash(digest.as_bytes());
        self.chain.update(link.as_bytes());
        self.lines_emitted += 1;

        if let Some(dir) = &self.snapshot_dir {
            let snapshot = Snapshot {
                index,
                timestamp: bar.timestamp,
                portfolio,
                trade_count,
            };
            std::fs::create_dir_all(dir).map_err(|e| io_fail("snapshot dir", e))?;
            let path = dir.join(format!("snapshot_{index:06}.json"));
            let file = std::fs::File::create(&path).map_err(|e| io_fail("snapshot create", e))?;
            serde_json::to_writer_pretty(file, &snapshot).map_err(|e| {
                EngineError::failure(
                    index,
                    bar.ticker.clone(),
                    bar.timestamp,
                    format!("snapshot serialize: {e}"),
                )
            })?;
        }

        Ok(())
    }

    pub fn lines_emitted(&self) -> usize {
        self.lines_emitted
    }

    /// `H_final` over the links so far. Valid mid-run as well — an aborted
    /// run hashes the bars it processed.
    pub fn final_hash(&self) -> String {
        self.chain.clone().finalize().to_hex().to_string()
    }
}

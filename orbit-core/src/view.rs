//! Price view — the only window a strategy gets onto history.
//!
//! A view over one ticker's series, truncated at the bar currently being
//! processed. Indexing past the truncation point is a `LookaheadError`, not
//! a silent clamp: lookahead bias must fail loudly. The view is pure — the
//! same `(series, limit)` always exposes the same slice.

use crate::domain::Bar;
use crate::error::LookaheadError;

#[derive(Debug, Clone, Copy)]
pub struct PriceView<'a> {
    bars: &'a [Bar],
    /// Index of the current bar; everything past it is invisible.
    limit: usize,
}

impl<'a> PriceView<'a> {
    /// `limit` is the index of the bar being processed; `bars` is the full
    /// per-ticker series.
    pub fn new(bars: &'a [Bar], limit: usize) -> Self {
        debug_assert!(limit < bars.len());
        Self { bars, limit }
    }

    /// Number of visible bars (`limit + 1`).
    pub fn len(&self) -> usize {
        self.limit + 1
    }

    pub fn is_empty(&self) -> bool {
        false // a view always contains at least the current bar
    }

    /// The bar at absolute index `j`, or `LookaheadError` if `j` is in the
    /// future relative to this view.
    pub fn bar(&self, j: usize) -> Result<&'a Bar, LookaheadError> {
        if j > self.limit {
            return Err(LookaheadError {
                requested: j,
                limit: self.limit,
            });
        }
        Ok(&self.bars[j])
    }

    /// The bar currently being processed.
    pub fn current(&self) -> &'a Bar {
        &self.bars[self.limit]
    }

    /// All visible bars, oldest first.
    pub fn upto(&self) -> &'a [Bar] {
        &self.bars[..=self.limit]
    }

    /// The last `n` visible bars (fewer if history is short).
    pub fn tail(&self, n: usize) -> &'a [Bar] {
        let start = self.len().saturating_sub(n);
        &self.bars[start..=self.limit]
    }
}

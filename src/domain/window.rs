//! Rolling window geometry and the window-pair partitioner.
//!
//! All quantities here are in date-index units. For a pair starting at
//! cursor `s` with allocation length `L` and evaluation length `F`:
//!
//! ```text
//! allocation  [s, s + L)
//! evaluation          [s + L - 1, s + L - 1 + F)
//! ```
//!
//! The evaluation window opens on the allocation window's last date so that
//! its first close is the price the allocation was decided at.

use crate::domain::error::BacktestError;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub allocation_len: usize,
    pub evaluation_len: usize,
    pub stride: usize,
}

impl WindowSpec {
    pub fn new(
        allocation_len: usize,
        evaluation_len: usize,
        stride: usize,
    ) -> Result<Self, BacktestError> {
        let invalid = |key: &str, reason: &str| BacktestError::ConfigInvalid {
            section: "backtest".into(),
            key: key.into(),
            reason: reason.into(),
        };
        if allocation_len < 1 {
            return Err(invalid("allocation_window", "must be at least 1"));
        }
        if evaluation_len < 2 {
            return Err(invalid(
                "evaluation_window",
                "must be at least 2 (entry and exit close)",
            ));
        }
        if stride < 1 {
            return Err(invalid("stride", "must be at least 1"));
        }
        if allocation_len.checked_add(evaluation_len).is_none() {
            return Err(invalid(
                "allocation_window",
                "allocation and evaluation lengths together overflow",
            ));
        }
        Ok(Self {
            allocation_len,
            evaluation_len,
            stride,
        })
    }

    /// Dates covered by one pair, allocation and evaluation together.
    pub fn span(&self) -> usize {
        self.allocation_len + self.evaluation_len - 1
    }
}

/// One (allocation, evaluation) pair in date-index units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPair {
    pub index: usize,
    pub allocation: Range<usize>,
    pub evaluation: Range<usize>,
}

impl WindowPair {
    fn at(index: usize, start: usize, spec: &WindowSpec) -> Self {
        let decision = start + spec.allocation_len - 1;
        Self {
            index,
            allocation: start..start + spec.allocation_len,
            evaluation: decision..decision + spec.evaluation_len,
        }
    }

    pub fn start(&self) -> usize {
        self.allocation.start
    }
}

#[derive(Debug, Clone)]
pub struct WindowPartitioner {
    spec: WindowSpec,
    num_dates: usize,
}

impl WindowPartitioner {
    /// Fails with [`BacktestError::InsufficientData`] when not even the first
    /// pair fits in `num_dates`.
    pub fn new(spec: WindowSpec, num_dates: usize) -> Result<Self, BacktestError> {
        if spec.span() > num_dates {
            return Err(BacktestError::InsufficientData {
                required: spec.span(),
                available: num_dates,
            });
        }
        Ok(Self { spec, num_dates })
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// A fresh pass over all pairs, starting at cursor 0.
    pub fn windows(&self) -> Windows {
        Windows {
            spec: self.spec,
            num_dates: self.num_dates,
            cursor: 0,
            index: 0,
        }
    }

    /// Number of pairs a full pass yields.
    pub fn count(&self) -> usize {
        (self.num_dates - self.spec.span()) / self.spec.stride + 1
    }
}

/// Lazy sequence of window pairs.
#[derive(Debug, Clone)]
pub struct Windows {
    spec: WindowSpec,
    num_dates: usize,
    cursor: usize,
    index: usize,
}

impl Iterator for Windows {
    type Item = WindowPair;

    fn next(&mut self) -> Option<WindowPair> {
        // checked before producing, so a short trailing window is never emitted
        let end = self.cursor.checked_add(self.spec.span())?;
        if end > self.num_dates {
            return None;
        }
        let pair = WindowPair::at(self.index, self.cursor, &self.spec);
        self.cursor = self.cursor.saturating_add(self.spec.stride);
        self.index += 1;
        Some(pair)
    }
}

//! Allocation strategies: allocation window in, target weights out.

use crate::domain::error::BacktestError;
use crate::domain::table::TableSlice;
use std::collections::BTreeMap;
use std::fmt;

/// Target weights keyed by ticker. Weights need not sum to one; the remainder
/// is held as cash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Allocation {
    weights: BTreeMap<String, f64>,
}

impl Allocation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, ticker: impl Into<String>, weight: f64) {
        self.weights.insert(ticker.into(), weight);
    }

    /// Weight for `ticker`; tickers without an entry hold zero.
    pub fn weight(&self, ticker: &str) -> f64 {
        self.weights.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.weights.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn cash(&self) -> f64 {
        1.0 - self.total()
    }
}

impl FromIterator<(String, f64)> for Allocation {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            weights: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .weights
            .iter()
            .map(|(t, w)| format!("{t}:{w:.3}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Maps an allocation window to target weights.
///
/// Implementations must be pure functions of the window so that a backtest is
/// reproducible.
pub trait AllocationStrategy {
    fn name(&self) -> &str;

    /// Whether negative weights are part of this strategy's contract.
    fn allows_shorting(&self) -> bool {
        false
    }

    fn allocate(&self, window: &TableSlice<'_>) -> Result<Allocation, BacktestError>;
}

/// Check a strategy's output against the window it was computed from.
pub fn validate_allocation(
    window: &TableSlice<'_>,
    allocation: &Allocation,
    allows_shorting: bool,
) -> Result<(), BacktestError> {
    for (ticker, weight) in allocation.iter() {
        let reason = if !window.contains_ticker(ticker) {
            Some("ticker is not present in the allocation window".to_string())
        } else if !weight.is_finite() {
            Some(format!("weight {weight} is not finite"))
        } else if weight < 0.0 && !allows_shorting {
            Some(format!("negative weight {weight} but shorting is not allowed"))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(BacktestError::InvalidAllocation {
                window: window.bounds(),
                ticker: ticker.to_string(),
                reason,
            });
        }
    }
    Ok(())
}

/// `1/n` on every ticker in the window.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualWeight;

impl AllocationStrategy for EqualWeight {
    fn name(&self) -> &str {
        "equal_weight"
    }

    fn allocate(&self, window: &TableSlice<'_>) -> Result<Allocation, BacktestError> {
        let tickers = window.tickers();
        let weight = 1.0 / tickers.len() as f64;
        Ok(tickers.iter().map(|t| (t.clone(), weight)).collect())
    }
}

/// Weights proportional to positive trailing return over the window.
///
/// A ticker whose first or last usable close is missing, or whose trailing
/// return is not positive, gets no weight. With no positive ticker the
/// allocation is all cash.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrailingMomentum;

impl TrailingMomentum {
    fn trailing_return(window: &TableSlice<'_>, ticker: &str) -> Option<f64> {
        let column = window.column(ticker)?;
        let first = column.first().usable_close()?;
        let last = column.last_available()?.usable_close()?;
        Some(last / first - 1.0)
    }
}

impl AllocationStrategy for TrailingMomentum {
    fn name(&self) -> &str {
        "momentum"
    }

    fn allocate(&self, window: &TableSlice<'_>) -> Result<Allocation, BacktestError> {
        let scores: Vec<(String, f64)> = window
            .tickers()
            .iter()
            .map(|t| {
                let score = Self::trailing_return(window, t)
                    .filter(|r| *r > 0.0)
                    .unwrap_or(0.0);
                (t.clone(), score)
            })
            .collect();

        let total: f64 = scores.iter().map(|(_, s)| s).sum();
        if total <= 0.0 {
            return Ok(scores.into_iter().map(|(t, _)| (t, 0.0)).collect());
        }
        Ok(scores.into_iter().map(|(t, s)| (t, s / total)).collect())
    }
}

/// Look up a built-in strategy by its configured name.
pub fn strategy_from_name(name: &str) -> Option<Box<dyn AllocationStrategy>> {
    match name.trim().to_lowercase().as_str() {
        "equal_weight" | "equal" => Some(Box::new(EqualWeight)),
        "momentum" | "trailing_momentum" => Some(Box::new(TrailingMomentum)),
        _ => None,
    }
}

//! Multiplicative accumulation of window returns.

use crate::domain::returns::{PerformanceKey, ReturnResult};
use crate::domain::universe::Universe;
use std::collections::BTreeMap;

/// Cumulative growth factor per ticker and for the portfolio.
#[derive(Debug, Clone, PartialEq)]
pub struct RunningReturn {
    factors: BTreeMap<PerformanceKey, f64>,
}

impl RunningReturn {
    /// Every ticker in `universe` plus the portfolio, all at 1.0.
    pub fn new(universe: &Universe) -> Self {
        let mut factors: BTreeMap<PerformanceKey, f64> = universe
            .tickers()
            .iter()
            .map(|t| (PerformanceKey::asset(t.clone()), 1.0))
            .collect();
        factors.insert(PerformanceKey::Portfolio, 1.0);
        Self { factors }
    }

    pub fn get(&self, key: &PerformanceKey) -> Option<f64> {
        self.factors.get(key).copied()
    }

    pub fn asset(&self, ticker: &str) -> Option<f64> {
        self.get(&PerformanceKey::asset(ticker))
    }

    pub fn portfolio(&self) -> f64 {
        self.factors
            .get(&PerformanceKey::Portfolio)
            .copied()
            .unwrap_or(1.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PerformanceKey, f64)> + '_ {
        self.factors.iter().map(|(k, v)| (k, *v))
    }
}

/// Fold one window's realized returns into `running`.
///
/// Only keys present in `realized` move. No cost or rebalancing adjustment is
/// applied.
pub fn compound(running: &mut RunningReturn, realized: &ReturnResult) {
    for (key, r) in realized.iter() {
        *running.factors.entry(key.clone()).or_insert(1.0) *= 1.0 + r;
    }
}

//! Realized return scoring over an evaluation window.

use crate::domain::allocation::Allocation;
use crate::domain::error::BacktestError;
use crate::domain::table::TableSlice;
use std::collections::BTreeMap;
use std::fmt;

/// Key space shared by realized and running returns.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PerformanceKey {
    Asset(String),
    Portfolio,
}

impl PerformanceKey {
    pub fn asset(ticker: impl Into<String>) -> Self {
        PerformanceKey::Asset(ticker.into())
    }
}

impl fmt::Display for PerformanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformanceKey::Asset(t) => f.write_str(t),
            PerformanceKey::Portfolio => f.write_str("portfolio"),
        }
    }
}

/// Fractional returns realized over one evaluation window.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnResult {
    returns: BTreeMap<PerformanceKey, f64>,
}

impl ReturnResult {
    pub fn new(portfolio: f64) -> Self {
        let mut returns = BTreeMap::new();
        returns.insert(PerformanceKey::Portfolio, portfolio);
        Self { returns }
    }

    pub fn insert_asset(&mut self, ticker: impl Into<String>, value: f64) {
        self.returns.insert(PerformanceKey::asset(ticker), value);
    }

    pub fn get(&self, key: &PerformanceKey) -> Option<f64> {
        self.returns.get(key).copied()
    }

    pub fn asset(&self, ticker: &str) -> Option<f64> {
        self.get(&PerformanceKey::asset(ticker))
    }

    pub fn portfolio(&self) -> f64 {
        self.returns
            .get(&PerformanceKey::Portfolio)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PerformanceKey, f64)> + '_ {
        self.returns.iter().map(|(k, v)| (k, *v))
    }
}

/// Scores an allocation against what happened in the evaluation window.
pub trait ReturnCalculator {
    fn score(
        &self,
        window: &TableSlice<'_>,
        allocation: &Allocation,
    ) -> Result<ReturnResult, BacktestError>;
}

/// First-close to last-available-close return per ticker, weighted sum for
/// the portfolio. Cash earns nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloseToClose;

enum Scored {
    Return(f64),
    Undefined(chrono::NaiveDate),
}

impl CloseToClose {
    fn ticker_return(window: &TableSlice<'_>, ticker: &str) -> Option<Scored> {
        let column = window.column(ticker)?;
        let first = column.first();
        let Some(entry) = first.usable_close() else {
            return Some(Scored::Undefined(first.date));
        };
        let exit = column
            .last_available()
            .and_then(|r| r.usable_close())
            .unwrap_or(entry);
        Some(Scored::Return(exit / entry - 1.0))
    }
}

impl ReturnCalculator for CloseToClose {
    fn score(
        &self,
        window: &TableSlice<'_>,
        allocation: &Allocation,
    ) -> Result<ReturnResult, BacktestError> {
        let mut portfolio = 0.0;
        let mut asset_returns = Vec::with_capacity(window.tickers().len());

        for ticker in window.tickers() {
            let weight = allocation.weight(ticker);
            match Self::ticker_return(window, ticker) {
                Some(Scored::Return(r)) => {
                    portfolio += weight * r;
                    asset_returns.push((ticker, r));
                }
                Some(Scored::Undefined(date)) if weight != 0.0 => {
                    return Err(BacktestError::MissingPrice {
                        window: window.bounds(),
                        ticker: ticker.clone(),
                        date,
                    });
                }
                // zero-weight tickers with no entry price are left unscored
                Some(Scored::Undefined(_)) | None => {}
            }
        }

        let mut result = ReturnResult::new(portfolio);
        for (ticker, r) in asset_returns {
            result.insert_asset(ticker.clone(), r);
        }
        Ok(result)
    }
}

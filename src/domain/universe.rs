//! Ticker universe for a backtest run.
//!
//! The universe is an ordered, duplicate-free set of tickers. Order matters:
//! it fixes the row order within each date of the evaluation table and the
//! order of per-ticker output.

use crate::domain::error::BacktestError;
use crate::ports::data_port::PriceDataPort;
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    tickers: Vec<String>,
    positions: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateTicker(String),

    #[error("ticker universe is empty")]
    Empty,

    #[error("failed to read symbols file: {0}")]
    SymbolsFile(String),
}

impl Universe {
    pub fn new(tickers: Vec<String>) -> Result<Self, UniverseError> {
        if tickers.is_empty() {
            return Err(UniverseError::Empty);
        }
        let mut positions = HashMap::with_capacity(tickers.len());
        for (i, t) in tickers.iter().enumerate() {
            if t.is_empty() {
                return Err(UniverseError::EmptyToken);
            }
            if positions.insert(t.clone(), i).is_some() {
                return Err(UniverseError::DuplicateTicker(t.clone()));
            }
        }
        Ok(Self { tickers, positions })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    pub fn position(&self, ticker: &str) -> Option<usize> {
        self.positions.get(ticker).copied()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.positions.contains_key(ticker)
    }
}

/// Parse a comma-separated ticker list such as `"aapl, MSFT,goog"`.
pub fn parse_tickers(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let ticker = trimmed.to_uppercase();
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

/// Read a symbols file: one ticker per record, taken from the first column.
///
/// The file has no header. Blank first cells are skipped; repeats are an error.
pub fn read_symbols<R: Read>(reader: R) -> Result<Vec<String>, UniverseError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut tickers = Vec::new();
    let mut seen = HashSet::new();
    for record in rdr.records() {
        let record = record.map_err(|e| UniverseError::SymbolsFile(e.to_string()))?;
        let Some(cell) = record.get(0) else { continue };
        let ticker = cell.trim().to_uppercase();
        if ticker.is_empty() {
            continue;
        }
        if !seen.insert(ticker.clone()) {
            return Err(UniverseError::DuplicateTicker(ticker));
        }
        tickers.push(ticker);
    }
    Ok(tickers)
}

pub struct UniverseValidationResult {
    pub universe: Universe,
    pub skipped: Vec<String>,
}

/// Drop tickers the store has no rows for inside `[start_date, end_date]`.
///
/// Fails only when every ticker is dropped.
pub fn validate_universe(
    data_port: &dyn PriceDataPort,
    tickers: Vec<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<UniverseValidationResult, BacktestError> {
    let mut valid = Vec::new();
    let mut skipped = Vec::new();
    let total = tickers.len();

    for ticker in tickers {
        match data_port.get_data_range(&ticker) {
            Ok(Some((first, last, rows))) => {
                let overlaps = start_date.is_none_or(|s| last >= s)
                    && end_date.is_none_or(|e| first <= e);
                if overlaps {
                    info!(%ticker, rows, %first, %last, "ticker ok");
                    valid.push(ticker);
                } else {
                    warn!(%ticker, %first, %last, "skipping ticker: no rows in requested range");
                    skipped.push(ticker);
                }
            }
            Ok(None) => {
                warn!(%ticker, "skipping ticker: no data found");
                skipped.push(ticker);
            }
            Err(e) => {
                warn!(%ticker, error = %e, "skipping ticker");
                skipped.push(ticker);
            }
        }
    }

    if valid.is_empty() {
        return Err(BacktestError::InsufficientData {
            required: 1,
            available: 0,
        });
    }
    if !skipped.is_empty() {
        info!("backtesting {} of {} tickers", valid.len(), total);
    }

    Ok(UniverseValidationResult {
        universe: Universe::new(valid)?,
        skipped,
    })
}

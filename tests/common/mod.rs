#![allow(dead_code)]

use chrono::NaiveDate;
use rollingbt::domain::backtest::BacktestConfig;
use rollingbt::domain::error::BacktestError;
use rollingbt::domain::price::{DailyBar, PriceRecord};
use rollingbt::domain::table::TimeSeriesTable;
use rollingbt::domain::universe::Universe;
use rollingbt::domain::window::WindowSpec;
use rollingbt::ports::data_port::{BarSourcePort, BarStorePort, PriceDataPort};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Consecutive calendar days starting 2024-01-01.
pub fn day(i: usize) -> NaiveDate {
    date(2024, 1, 1) + chrono::Days::new(i as u64)
}

pub fn universe(tickers: &[&str]) -> Universe {
    Universe::new(tickers.iter().map(|t| t.to_string()).collect()).unwrap()
}

/// Records for `series`, one close per day per ticker, in date order.
pub fn records(series: &[(&str, Vec<Option<f64>>)]) -> Vec<PriceRecord> {
    let days = series.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
    let mut out = Vec::new();
    for i in 0..days {
        for (ticker, closes) in series {
            if let Some(close) = closes.get(i) {
                out.push(PriceRecord::new(day(i), *ticker, *close));
            }
        }
    }
    out
}

pub fn table(series: &[(&str, Vec<Option<f64>>)]) -> TimeSeriesTable {
    let tickers: Vec<&str> = series.iter().map(|(t, _)| *t).collect();
    TimeSeriesTable::from_records(records(series), universe(&tickers)).unwrap()
}

pub fn closes(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}

/// A deterministic wiggly price path of `n` closes.
pub fn path(n: usize, base: f64, drift: f64) -> Vec<Option<f64>> {
    (0..n)
        .map(|i| Some(base + drift * i as f64 + ((i * 7) % 5) as f64 * 0.3))
        .collect()
}

pub fn config(tickers: &[&str], alloc: usize, eval: usize, stride: usize) -> BacktestConfig {
    BacktestConfig {
        windows: WindowSpec::new(alloc, eval, stride).unwrap(),
        universe: universe(tickers),
    }
}

pub fn make_bar(ticker: &str, d: NaiveDate, close: f64) -> DailyBar {
    DailyBar {
        date: d,
        ticker: ticker.to_string(),
        open: Some(close),
        high: Some(close),
        low: Some(close),
        close: Some(close),
        adj_close: None,
        volume: Some(1_000.0),
    }
}

/// In-memory price store keyed by ticker.
pub struct MockDataPort {
    pub data: BTreeMap<String, Vec<PriceRecord>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_closes(mut self, ticker: &str, closes: Vec<Option<f64>>) -> Self {
        let rows = closes
            .into_iter()
            .enumerate()
            .map(|(i, c)| PriceRecord::new(day(i), ticker, c))
            .collect();
        self.data.insert(ticker.to_string(), rows);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl PriceDataPort for MockDataPort {
    fn fetch_closes(
        &self,
        tickers: &[String],
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceRecord>, BacktestError> {
        let mut out: Vec<PriceRecord> = tickers
            .iter()
            .filter_map(|t| self.data.get(t))
            .flatten()
            .filter(|r| start_date.is_none_or(|s| r.date >= s))
            .filter(|r| end_date.is_none_or(|e| r.date <= e))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.ticker.cmp(&b.ticker)));
        Ok(out)
    }

    fn list_tickers(&self) -> Result<Vec<String>, BacktestError> {
        Ok(self.data.keys().cloned().collect())
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(BacktestError::Database {
                reason: reason.clone(),
            });
        }
        match self.data.get(ticker) {
            Some(rows) if !rows.is_empty() => {
                let min = rows.iter().map(|r| r.date).min().unwrap();
                let max = rows.iter().map(|r| r.date).max().unwrap();
                Ok(Some((min, max, rows.len())))
            }
            _ => Ok(None),
        }
    }
}

/// Bar source serving fixed bars, honouring the date filters.
pub struct MockBarSource {
    pub bars: HashMap<String, Vec<DailyBar>>,
}

impl MockBarSource {
    pub fn new() -> Self {
        Self {
            bars: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<DailyBar>) -> Self {
        self.bars.insert(ticker.to_string(), bars);
        self
    }
}

impl BarSourcePort for MockBarSource {
    fn fetch_bars(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, BacktestError> {
        let bars = self.bars.get(ticker).ok_or_else(|| BacktestError::DataFormat {
            reason: format!("no file for {}", ticker),
        })?;
        Ok(bars
            .iter()
            .filter(|b| start_date.is_none_or(|s| b.date >= s))
            .filter(|b| end_date.is_none_or(|e| b.date <= e))
            .cloned()
            .collect())
    }
}

/// Store that records every insert batch.
pub struct RecordingStore {
    pub rows: RefCell<BTreeMap<(NaiveDate, String), DailyBar>>,
    pub batches: RefCell<Vec<usize>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            rows: RefCell::new(BTreeMap::new()),
            batches: RefCell::new(Vec::new()),
        }
    }
}

impl BarStorePort for RecordingStore {
    fn last_date(&self) -> Result<Option<NaiveDate>, BacktestError> {
        Ok(self.rows.borrow().keys().map(|(d, _)| *d).max())
    }

    fn insert_bars(&self, bars: &[DailyBar]) -> Result<usize, BacktestError> {
        self.batches.borrow_mut().push(bars.len());
        let mut rows = self.rows.borrow_mut();
        let mut written = 0;
        for bar in bars {
            let key = (bar.date, bar.ticker.clone());
            if !rows.contains_key(&key) {
                rows.insert(key, bar.clone());
                written += 1;
            }
        }
        Ok(written)
    }
}

//! CSV bar source: one `<TICKER>.csv` file per ticker.
//!
//! Files carry a header row. Recognised columns (case-insensitive) are
//! `date`, `open`, `high`, `low`, `close`, `adj close`/`adj_close` and
//! `volume`; only `date` is mandatory. Empty, `null` and `nan` cells are
//! stored as missing.

use crate::domain::error::BacktestError;
use crate::domain::price::DailyBar;
use crate::ports::data_port::BarSourcePort;
use chrono::NaiveDate;
use std::fs::File;
use std::path::PathBuf;
use tracing::debug;

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Default)]
struct Columns {
    date: Option<usize>,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: Option<usize>,
    adj_close: Option<usize>,
    volume: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let mut cols = Columns::default();
        for (i, h) in headers.iter().enumerate() {
            let slot = match h.trim().to_lowercase().replace('_', " ").as_str() {
                "date" => &mut cols.date,
                "open" => &mut cols.open,
                "high" => &mut cols.high,
                "low" => &mut cols.low,
                "close" => &mut cols.close,
                "adj close" => &mut cols.adj_close,
                "volume" => &mut cols.volume,
                _ => continue,
            };
            *slot = Some(i);
        }
        cols
    }
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }

    fn parse_value(
        record: &csv::StringRecord,
        col: Option<usize>,
        name: &str,
        line: u64,
    ) -> Result<Option<f64>, BacktestError> {
        let Some(raw) = col.and_then(|c| record.get(c)).map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("nan") {
            return Ok(None);
        }
        raw.parse::<f64>()
            .map(Some)
            .map_err(|e| BacktestError::DataFormat {
                reason: format!("line {}: invalid {} value '{}': {}", line, name, raw, e),
            })
    }
}

impl BarSourcePort for CsvAdapter {
    fn fetch_bars(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, BacktestError> {
        let path = self.csv_path(ticker);
        let file = File::open(&path).map_err(|e| BacktestError::DataFormat {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(file);
        let headers = rdr.headers().map_err(|e| BacktestError::DataFormat {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let cols = Columns::from_headers(headers);
        let date_col = cols.date.ok_or_else(|| BacktestError::DataFormat {
            reason: format!("{}: missing date column", path.display()),
        })?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| BacktestError::DataFormat {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let date_str = record.get(date_col).unwrap_or("").trim();
            // providers sometimes append a time component
            let date_part = date_str.split([' ', 'T']).next().unwrap_or(date_str);
            let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| {
                BacktestError::DataFormat {
                    reason: format!("line {}: invalid date '{}': {}", line, date_str, e),
                }
            })?;

            if start_date.is_some_and(|s| date < s) || end_date.is_some_and(|e| date > e) {
                continue;
            }

            bars.push(DailyBar {
                date,
                ticker: ticker.to_string(),
                open: Self::parse_value(&record, cols.open, "open", line)?,
                high: Self::parse_value(&record, cols.high, "high", line)?,
                low: Self::parse_value(&record, cols.low, "low", line)?,
                close: Self::parse_value(&record, cols.close, "close", line)?,
                adj_close: Self::parse_value(&record, cols.adj_close, "adj close", line)?,
                volume: Self::parse_value(&record, cols.volume, "volume", line)?,
            });
        }

        bars.sort_by_key(|b| b.date);
        debug!(%ticker, bars = bars.len(), "read csv bars");
        Ok(bars)
    }
}

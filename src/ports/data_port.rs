//! Price data access port trait.

use crate::domain::error::BacktestError;
use crate::domain::price::{DailyBar, PriceRecord};
use chrono::NaiveDate;

/// Read side of the bar store.
pub trait PriceDataPort {
    /// Close-price rows for `tickers` within the optional date bounds,
    /// ordered by date ascending.
    fn fetch_closes(
        &self,
        tickers: &[String],
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceRecord>, BacktestError>;

    fn list_tickers(&self) -> Result<Vec<String>, BacktestError>;

    /// `(first date, last date, row count)` for one ticker, `None` if absent.
    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError>;
}

/// Write side of the bar store, with resume support.
pub trait BarStorePort {
    /// Latest date stored for any ticker.
    fn last_date(&self) -> Result<Option<NaiveDate>, BacktestError>;

    /// Insert bars, ignoring any whose (date, ticker) already exists.
    /// Returns the number of rows actually written.
    fn insert_bars(&self, bars: &[DailyBar]) -> Result<usize, BacktestError>;
}

/// Source of raw daily bars for a ticker (the acquisition side).
pub trait BarSourcePort {
    fn fetch_bars(
        &self,
        ticker: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<DailyBar>, BacktestError>;
}

//! The evaluation table: a date-ordered panel of close prices.
//!
//! Rows are stored flat, grouped by date, and within a date in universe order.
//! Two indices sit on top of the rows:
//!
//! - the **date index** (`dates`), which is what every window computation
//!   works in;
//! - the **row offsets** (`row_offsets[d]..row_offsets[d + 1]` are the rows of
//!   date `d`), which only this module uses to turn a date range into rows.
//!
//! Nothing outside this module ever converts between the two.

use crate::domain::error::{BacktestError, WindowBounds};
use crate::domain::price::PriceRecord;
use crate::domain::universe::Universe;
use chrono::NaiveDate;
use std::ops::Range;

#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    universe: Universe,
    dates: Vec<NaiveDate>,
    row_offsets: Vec<usize>,
    rows: Vec<PriceRecord>,
}

impl TimeSeriesTable {
    /// Build a table from date-ordered records.
    ///
    /// Records must be sorted ascending by date; order within a date is free.
    /// A ticker outside `universe` or a repeated `(date, ticker)` is rejected.
    /// Dates on which some tickers have no row are accepted here and reported
    /// as [`BacktestError::MisalignedWindow`] when a window touches them.
    pub fn from_records(
        records: Vec<PriceRecord>,
        universe: Universe,
    ) -> Result<Self, BacktestError> {
        let mut dates: Vec<NaiveDate> = Vec::new();
        let mut row_offsets: Vec<usize> = Vec::new();
        let mut rows: Vec<PriceRecord> = Vec::with_capacity(records.len());

        for record in records {
            if universe.position(&record.ticker).is_none() {
                return Err(BacktestError::DataFormat {
                    reason: format!(
                        "{} on {} is not in the ticker universe",
                        record.ticker, record.date
                    ),
                });
            }
            match dates.last() {
                Some(last) if record.date < *last => {
                    return Err(BacktestError::DataFormat {
                        reason: format!(
                            "records out of date order: {} after {}",
                            record.date, last
                        ),
                    });
                }
                Some(last) if record.date == *last => {}
                _ => {
                    dates.push(record.date);
                    row_offsets.push(rows.len());
                }
            }
            rows.push(record);
        }
        row_offsets.push(rows.len());

        for d in 0..dates.len() {
            let group = &mut rows[row_offsets[d]..row_offsets[d + 1]];
            group.sort_by_key(|r| universe.position(&r.ticker));
            if let Some(pair) = group.windows(2).find(|w| w[0].ticker == w[1].ticker) {
                return Err(BacktestError::DataFormat {
                    reason: format!("duplicate row for {} on {}", pair[0].ticker, pair[0].date),
                });
            }
        }

        Ok(Self {
            universe,
            dates,
            row_offsets,
            rows,
        })
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rectangular view over the dates `range` (date-index units).
    ///
    /// Fails with [`BacktestError::MisalignedWindow`] if any universe ticker
    /// lacks a row on any date in the range.
    pub fn slice(&self, range: Range<usize>) -> Result<TableSlice<'_>, BacktestError> {
        if range.is_empty() || range.end > self.dates.len() {
            return Err(BacktestError::InsufficientData {
                required: range.end,
                available: self.dates.len(),
            });
        }
        let bounds = WindowBounds {
            first: self.dates[range.start],
            last: self.dates[range.end - 1],
        };
        for d in range.clone() {
            let group = self.rows_of(d);
            if group.len() != self.universe.len() {
                let missing = self
                    .universe
                    .tickers()
                    .iter()
                    .find(|t| !group.iter().any(|r| &r.ticker == *t))
                    .cloned()
                    .unwrap_or_default();
                return Err(BacktestError::MisalignedWindow {
                    window: bounds,
                    ticker: missing,
                    date: self.dates[d],
                });
            }
        }
        Ok(TableSlice {
            table: self,
            dates: range,
        })
    }

    fn rows_of(&self, date_index: usize) -> &[PriceRecord] {
        &self.rows[self.row_offsets[date_index]..self.row_offsets[date_index + 1]]
    }
}

/// A rectangular, date-contiguous window of a [`TimeSeriesTable`].
#[derive(Debug, Clone)]
pub struct TableSlice<'a> {
    table: &'a TimeSeriesTable,
    dates: Range<usize>,
}

impl<'a> TableSlice<'a> {
    pub fn bounds(&self) -> WindowBounds {
        WindowBounds {
            first: self.table.dates[self.dates.start],
            last: self.table.dates[self.dates.end - 1],
        }
    }

    pub fn dates(&self) -> &'a [NaiveDate] {
        &self.table.dates[self.dates.clone()]
    }

    pub fn num_dates(&self) -> usize {
        self.dates.len()
    }

    pub fn tickers(&self) -> &'a [String] {
        self.table.universe.tickers()
    }

    pub fn contains_ticker(&self, ticker: &str) -> bool {
        self.table.universe.contains(ticker)
    }

    /// Record for `(ticker, date)`, `None` if either is outside the slice.
    pub fn get(&self, ticker: &str, date: NaiveDate) -> Option<&'a PriceRecord> {
        let column = self.column(ticker)?;
        let offset = self.dates().binary_search(&date).ok()?;
        Some(column.at(offset))
    }

    /// All records of one ticker in date order.
    pub fn column(&self, ticker: &str) -> Option<TickerColumn<'a>> {
        let position = self.table.universe.position(ticker)?;
        Some(TickerColumn {
            table: self.table,
            position,
            dates: self.dates.clone(),
        })
    }
}

/// One ticker's records inside a [`TableSlice`].
#[derive(Debug, Clone)]
pub struct TickerColumn<'a> {
    table: &'a TimeSeriesTable,
    position: usize,
    dates: Range<usize>,
}

impl<'a> TickerColumn<'a> {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Record at `offset` dates from the start of the slice.
    pub fn at(&self, offset: usize) -> &'a PriceRecord {
        // slices are rectangular, so the ticker's row sits at its universe position
        &self.table.rows_of(self.dates.start + offset)[self.position]
    }

    pub fn first(&self) -> &'a PriceRecord {
        self.at(0)
    }

    /// Latest record in the slice with a usable close.
    pub fn last_available(&self) -> Option<&'a PriceRecord> {
        (0..self.len())
            .rev()
            .map(|i| self.at(i))
            .find(|r| r.usable_close().is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a PriceRecord> + '_ {
        (0..self.len()).map(move |i| self.at(i))
    }
}

//! Daily bar and close-price record types.

use chrono::NaiveDate;

/// One stored daily bar, as imported from a data source.
///
/// Every price field is optional: providers leave holes on halted days and the
/// store keeps them as NULL rather than inventing a value.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub ticker: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<f64>,
}

impl DailyBar {
    /// The close the engine scores against: adjusted close when the source
    /// provides one, raw close otherwise.
    pub fn effective_close(&self) -> Option<f64> {
        self.adj_close.or(self.close)
    }

    pub fn to_price_record(&self) -> PriceRecord {
        PriceRecord {
            date: self.date,
            ticker: self.ticker.clone(),
            close: self.effective_close(),
        }
    }
}

/// A single (date, ticker, close) row of the evaluation table.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub close: Option<f64>,
}

impl PriceRecord {
    pub fn new(date: NaiveDate, ticker: impl Into<String>, close: Option<f64>) -> Self {
        Self {
            date,
            ticker: ticker.into(),
            close,
        }
    }

    /// A close that can serve as a return denominator.
    pub fn usable_close(&self) -> Option<f64> {
        self.close.filter(|c| c.is_finite() && *c != 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bar() -> DailyBar {
        DailyBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            ticker: "MSFT".into(),
            open: Some(100.0),
            high: Some(110.0),
            low: Some(90.0),
            close: Some(105.0),
            adj_close: Some(104.5),
            volume: Some(50_000.0),
        }
    }

    #[test]
    fn test_effective_close_prefers_adjusted() {
        let bar = sample_bar();
        assert_eq!(bar.effective_close(), Some(104.5));
    }

    #[test]
    fn test_effective_close_falls_back_to_raw() {
        let bar = DailyBar {
            adj_close: None,
            ..sample_bar()
        };
        assert_eq!(bar.effective_close(), Some(105.0));
    }

    #[test]
    fn test_price_record_from_bar() {
        let rec = sample_bar().to_price_record();
        assert_eq!(rec.ticker, "MSFT");
        assert_eq!(rec.close, Some(104.5));
    }

    #[test]
    fn test_usable_close_rejects_zero_and_nan() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(PriceRecord::new(d, "A", Some(0.0)).usable_close(), None);
        assert_eq!(PriceRecord::new(d, "A", Some(f64::NAN)).usable_close(), None);
        assert_eq!(PriceRecord::new(d, "A", None).usable_close(), None);
        assert_eq!(PriceRecord::new(d, "A", Some(12.5)).usable_close(), Some(12.5));
    }
}

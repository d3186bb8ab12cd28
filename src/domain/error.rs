//! Domain error types.

use chrono::NaiveDate;
use std::fmt;

use crate::domain::universe::UniverseError;

/// Calendar bounds of a window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.first, self.last)
    }
}

/// Top-level error type for rollingbt.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("insufficient data: need {required} dates for one window pair, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("misaligned window {window}: {ticker} has no row on {date}")]
    MisalignedWindow {
        window: WindowBounds,
        ticker: String,
        date: NaiveDate,
    },

    #[error("invalid allocation in window {window} for {ticker}: {reason}")]
    InvalidAllocation {
        window: WindowBounds,
        ticker: String,
        reason: String,
    },

    #[error("missing price in window {window}: {ticker} has no usable close on {date}")]
    MissingPrice {
        window: WindowBounds,
        ticker: String,
        date: NaiveDate,
    },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error("malformed price data: {reason}")]
    DataFormat { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BacktestError {
    /// True for the four failures raised by the rolling-window engine itself.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            BacktestError::InsufficientData { .. }
                | BacktestError::MisalignedWindow { .. }
                | BacktestError::InvalidAllocation { .. }
                | BacktestError::MissingPrice { .. }
        )
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        let code: u8 = match err {
            BacktestError::Io(_) => 1,
            BacktestError::ConfigParse { .. }
            | BacktestError::ConfigMissing { .. }
            | BacktestError::ConfigInvalid { .. } => 2,
            BacktestError::Database { .. } | BacktestError::DatabaseQuery { .. } => 3,
            BacktestError::Universe(_) | BacktestError::DataFormat { .. } => 4,
            BacktestError::InsufficientData { .. }
            | BacktestError::MisalignedWindow { .. }
            | BacktestError::InvalidAllocation { .. }
            | BacktestError::MissingPrice { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> WindowBounds {
        WindowBounds {
            first: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            last: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
        }
    }

    #[test]
    fn test_missing_price_message_names_window_and_ticker() {
        let err = BacktestError::MissingPrice {
            window: bounds(),
            ticker: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2024-01-02..=2024-01-08"));
        assert!(msg.contains("AAPL"));
    }

    #[test]
    fn test_engine_failures_are_classified() {
        assert!(BacktestError::InsufficientData {
            required: 20,
            available: 10
        }
        .is_engine_failure());
        assert!(!BacktestError::Database {
            reason: "locked".into()
        }
        .is_engine_failure());
    }
}

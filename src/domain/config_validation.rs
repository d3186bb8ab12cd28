//! Configuration validation and typed extraction.
//!
//! Window geometry has no defaults: every length must be present in the
//! `[backtest]` section.

use crate::domain::allocation::strategy_from_name;
use crate::domain::error::BacktestError;
use crate::domain::universe::{parse_tickers, read_symbols};
use crate::domain::window::WindowSpec;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::fs::File;
use std::path::{Path, PathBuf};

pub fn read_window_spec(config: &dyn ConfigPort) -> Result<WindowSpec, BacktestError> {
    let allocation = require_count(config, "backtest", "allocation_window")?;
    let evaluation = require_count(config, "backtest", "evaluation_window")?;
    let stride = require_count(config, "backtest", "stride")?;
    WindowSpec::new(allocation, evaluation, stride)
}

/// Optional `start_date`/`end_date` filters on the loaded history.
pub fn read_date_range(
    config: &dyn ConfigPort,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), BacktestError> {
    let start = optional_date(config, "start_date")?;
    let end = optional_date(config, "end_date")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s >= e {
            return Err(BacktestError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "start_date".to_string(),
                reason: "start_date must be before end_date".to_string(),
            });
        }
    }
    Ok((start, end))
}

/// Strategy name from `[backtest] strategy`, unless `name_override` is given.
pub fn read_strategy_name(
    config: &dyn ConfigPort,
    name_override: Option<&str>,
) -> Result<String, BacktestError> {
    let name = match name_override {
        Some(name) => name.to_string(),
        None => config
            .get_string("backtest", "strategy")
            .ok_or_else(|| BacktestError::ConfigMissing {
                section: "backtest".to_string(),
                key: "strategy".to_string(),
            })?,
    };
    if strategy_from_name(&name).is_none() {
        return Err(BacktestError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "strategy".to_string(),
            reason: format!("unknown strategy '{}' (expected equal_weight or momentum)", name.trim()),
        });
    }
    Ok(name.trim().to_lowercase())
}

/// Tickers from `[universe] tickers`, or else from `[universe] symbols_file`.
///
/// A relative symbols file is resolved against `base_dir`, normally the
/// directory of the config file.
pub fn read_tickers(
    config: &dyn ConfigPort,
    base_dir: &Path,
) -> Result<Vec<String>, BacktestError> {
    if let Some(list) = config
        .get_string("universe", "tickers")
        .filter(|s| !s.trim().is_empty())
    {
        return Ok(parse_tickers(&list)?);
    }
    if let Some(file) = config
        .get_string("universe", "symbols_file")
        .filter(|s| !s.trim().is_empty())
    {
        let path = resolve_path(base_dir, file.trim());
        let handle = File::open(&path).map_err(|e| BacktestError::ConfigInvalid {
            section: "universe".to_string(),
            key: "symbols_file".to_string(),
            reason: format!("cannot open {}: {}", path.display(), e),
        })?;
        return Ok(read_symbols(handle)?);
    }
    Err(BacktestError::ConfigMissing {
        section: "universe".to_string(),
        key: "tickers".to_string(),
    })
}

pub fn resolve_path(base_dir: &Path, value: &str) -> PathBuf {
    let p = PathBuf::from(value);
    if p.is_absolute() { p } else { base_dir.join(p) }
}

fn require_count(config: &dyn ConfigPort, section: &str, key: &str) -> Result<usize, BacktestError> {
    let raw = config
        .get_string(section, key)
        .ok_or_else(|| BacktestError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })?;
    raw.trim()
        .parse::<usize>()
        .map_err(|_| BacktestError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("expected a non-negative integer, got '{}'", raw.trim()),
        })
}

fn optional_date(config: &dyn ConfigPort, field: &str) -> Result<Option<NaiveDate>, BacktestError> {
    match config
        .get_string("backtest", field)
        .filter(|s| !s.trim().is_empty())
    {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| BacktestError::ConfigInvalid {
                section: "backtest".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapConfig(HashMap<(String, String), String>);

    impl MapConfig {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            )
        }
    }

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.0.get(&(section.to_string(), key.to_string())).cloned()
        }
        fn get_int(&self, section: &str, key: &str) -> Option<i64> {
            self.get_string(section, key)?.parse().ok()
        }
    }

    fn valid() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("backtest", "allocation_window", "15"),
            ("backtest", "evaluation_window", "5"),
            ("backtest", "stride", "4"),
            ("backtest", "strategy", "equal_weight"),
            ("universe", "tickers", "AAPL,MSFT"),
        ]
    }

    fn without(key: &str) -> MapConfig {
        let entries: Vec<_> = valid().into_iter().filter(|(_, k, _)| *k != key).collect();
        MapConfig::new(&entries)
    }

    fn with(extra: &[(&'static str, &'static str, &'static str)]) -> MapConfig {
        let mut entries = valid();
        entries.extend_from_slice(extra);
        MapConfig::new(&entries)
    }

    #[test]
    fn test_strategy_name_read_and_overridden() {
        let cfg = MapConfig::new(&valid());
        assert_eq!(read_strategy_name(&cfg, None).unwrap(), "equal_weight");
        assert_eq!(read_strategy_name(&cfg, Some("Momentum")).unwrap(), "momentum");
        let err = read_strategy_name(&without("strategy"), None).unwrap_err();
        assert!(matches!(err, BacktestError::ConfigMissing { key, .. } if key == "strategy"));
        assert!(read_strategy_name(&without("strategy"), Some("equal_weight")).is_ok());
    }

    #[test]
    fn test_window_spec_read() {
        let spec = read_window_spec(&MapConfig::new(&valid())).unwrap();
        assert_eq!(spec.allocation_len, 15);
        assert_eq!(spec.evaluation_len, 5);
        assert_eq!(spec.stride, 4);
    }

    #[test]
    fn test_window_lengths_have_no_defaults() {
        for key in ["allocation_window", "evaluation_window", "stride"] {
            let err = read_window_spec(&without(key)).unwrap_err();
            assert!(matches!(err, BacktestError::ConfigMissing { key: k, .. } if k == key));
        }
    }

    #[test]
    fn test_non_numeric_window_is_invalid() {
        let mut entries = valid();
        entries[2] = ("backtest", "stride", "four");
        let err = read_window_spec(&MapConfig::new(&entries)).unwrap_err();
        assert!(matches!(err, BacktestError::ConfigInvalid { key, .. } if key == "stride"));
    }

    #[test]
    fn test_zero_stride_is_invalid() {
        let mut entries = valid();
        entries[2] = ("backtest", "stride", "0");
        assert!(read_window_spec(&MapConfig::new(&entries)).is_err());
    }

    #[test]
    fn test_unknown_strategy_is_invalid() {
        let mut entries = valid();
        entries[3] = ("backtest", "strategy", "coin_flip");
        let err = read_strategy_name(&MapConfig::new(&entries), None).unwrap_err();
        assert!(matches!(err, BacktestError::ConfigInvalid { key, .. } if key == "strategy"));
    }

    #[test]
    fn test_date_range_optional_and_ordered() {
        assert_eq!(read_date_range(&MapConfig::new(&valid())).unwrap(), (None, None));
        let cfg = with(&[
            ("backtest", "start_date", "2024-01-01"),
            ("backtest", "end_date", "2023-01-01"),
        ]);
        assert!(read_date_range(&cfg).is_err());
        let cfg = with(&[("backtest", "start_date", "01/02/2024")]);
        assert!(read_date_range(&cfg).is_err());
    }

    #[test]
    fn test_missing_universe_is_reported() {
        let err = read_tickers(&without("tickers"), Path::new(".")).unwrap_err();
        assert!(matches!(err, BacktestError::ConfigMissing { section, .. } if section == "universe"));
    }

    #[test]
    fn test_inline_tickers_take_precedence() {
        let cfg = with(&[("universe", "symbols_file", "does-not-exist.csv")]);
        let tickers = read_tickers(&cfg, Path::new(".")).unwrap();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn test_symbols_file_resolved_relative_to_base() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("symbols.csv"), "IBM\nORCL\n").unwrap();
        let cfg = MapConfig::new(&[("universe", "symbols_file", "symbols.csv")]);
        let tickers = read_tickers(&cfg, dir.path()).unwrap();
        assert_eq!(tickers, vec!["IBM", "ORCL"]);
    }
}

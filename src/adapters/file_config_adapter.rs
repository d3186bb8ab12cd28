//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::{Path, PathBuf};

pub struct FileConfigAdapter {
    config: Ini,
    base_dir: PathBuf,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self { config, base_dir })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self {
            config,
            base_dir: PathBuf::from("."),
        })
    }

    /// Directory relative file paths in the config are resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str) -> Option<i64> {
        self.config.getint(section, key).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
[sqlite]
path = prices.sqlite3
pool_size = 2

[universe]
tickers = AAPL, MSFT

[backtest]
allocation_window = 15
evaluation_window = 5
stride = 4
strategy = equal_weight
"#;

    #[test]
    fn test_from_string_parses_sections() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(
            adapter.get_string("sqlite", "path"),
            Some("prices.sqlite3".to_string())
        );
        assert_eq!(
            adapter.get_string("universe", "tickers"),
            Some("AAPL, MSFT".to_string())
        );
        assert_eq!(adapter.base_dir(), Path::new("."));
    }

    #[test]
    fn test_get_string_returns_none_for_missing_key() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_string("backtest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn test_get_int_values() {
        let adapter = FileConfigAdapter::from_string(SAMPLE).unwrap();
        assert_eq!(adapter.get_int("backtest", "stride"), Some(4));
        assert_eq!(adapter.get_int("backtest", "strategy"), None);
        assert_eq!(adapter.get_int("backtest", "missing"), None);
    }

    #[test]
    fn test_from_file_records_base_dir() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", SAMPLE).unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.base_dir(), file.path().parent().unwrap());
        assert_eq!(adapter.get_int("sqlite", "pool_size"), Some(2));
    }

    #[test]
    fn test_from_file_returns_error_for_missing_file() {
        assert!(FileConfigAdapter::from_file("/nonexistent/path/config.ini").is_err());
    }
}

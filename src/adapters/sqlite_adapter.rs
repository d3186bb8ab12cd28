//! SQLite bar store.

use crate::domain::error::BacktestError;
use crate::domain::price::{DailyBar, PriceRecord};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{BarStorePort, PriceDataPort};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, types::Value};
use std::path::Path;
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: r2d2::Error) -> BacktestError {
    BacktestError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> BacktestError {
    BacktestError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, BacktestError> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| BacktestError::Database {
        reason: format!("bad stored date '{}': {}", s, e),
    })
}

impl SqliteAdapter {
    /// Open the store named by `[sqlite] path`, resolving relative paths
    /// against `base_dir`. The schema is created if missing.
    pub fn from_config(config: &dyn ConfigPort, base_dir: &Path) -> Result<Self, BacktestError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| BacktestError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;
        let db_path = crate::domain::config_validation::resolve_path(base_dir, db_path.trim());

        let pool_size = config
            .get_int("sqlite", "pool_size")
            .filter(|n| *n > 0)
            .unwrap_or(4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(db_err)?;

        debug!(path = %db_path.display(), pool_size, "opened sqlite store");
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    pub fn in_memory() -> Result<Self, BacktestError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;
        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, BacktestError> {
        self.pool.get().map_err(db_err)
    }

    pub fn initialize_schema(&self) -> Result<(), BacktestError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS stock_data (
                    date TEXT NOT NULL,
                    ticker TEXT NOT NULL,
                    open REAL,
                    high REAL,
                    low REAL,
                    close REAL,
                    adj_close REAL,
                    volume REAL,
                    PRIMARY KEY (date, ticker)
                );
                CREATE INDEX IF NOT EXISTS idx_stock_data_ticker ON stock_data(ticker);",
            )
            .map_err(query_err)
    }
}

impl BarStorePort for SqliteAdapter {
    fn last_date(&self) -> Result<Option<NaiveDate>, BacktestError> {
        let conn = self.conn()?;
        let last: Option<String> = conn
            .query_row("SELECT MAX(date) FROM stock_data", [], |row| row.get(0))
            .map_err(query_err)?;
        last.as_deref().map(parse_date).transpose()
    }

    fn insert_bars(&self, bars: &[DailyBar]) -> Result<usize, BacktestError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        let mut written = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO stock_data
                     (date, ticker, open, high, low, close, adj_close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(query_err)?;
            for bar in bars {
                written += stmt
                    .execute(params![
                        bar.date.format(DATE_FORMAT).to_string(),
                        bar.ticker,
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.adj_close,
                        bar.volume
                    ])
                    .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        Ok(written)
    }
}

impl PriceDataPort for SqliteAdapter {
    fn fetch_closes(
        &self,
        tickers: &[String],
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceRecord>, BacktestError> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;

        let placeholders = vec!["?"; tickers.len()].join(", ");
        let mut sql = format!(
            "SELECT date, ticker, COALESCE(adj_close, close)
             FROM stock_data
             WHERE ticker IN ({placeholders})"
        );
        let mut values: Vec<Value> = tickers.iter().map(|t| Value::Text(t.clone())).collect();
        if let Some(start) = start_date {
            sql.push_str(" AND date >= ?");
            values.push(Value::Text(start.format(DATE_FORMAT).to_string()));
        }
        if let Some(end) = end_date {
            sql.push_str(" AND date <= ?");
            values.push(Value::Text(end.format(DATE_FORMAT).to_string()));
        }
        sql.push_str(" ORDER BY date ASC, ticker ASC");

        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(values), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            })
            .map_err(query_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (date, ticker, close) = row.map_err(query_err)?;
            records.push(PriceRecord {
                date: parse_date(&date)?,
                ticker,
                close,
            });
        }
        debug!(rows = records.len(), "fetched closes");
        Ok(records)
    }

    fn list_tickers(&self) -> Result<Vec<String>, BacktestError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT ticker FROM stock_data ORDER BY ticker")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_err)
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, BacktestError> {
        let conn = self.conn()?;
        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM stock_data WHERE ticker = ?1",
                params![ticker],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                Ok(Some((parse_date(&min)?, parse_date(&max)?, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

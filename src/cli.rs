//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::allocation::{strategy_from_name, AllocationStrategy};
use crate::domain::backtest::{run_backtest, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{
    read_date_range, read_strategy_name, read_tickers, read_window_spec,
};
use crate::domain::error::BacktestError;
use crate::domain::metrics::Metrics;
use crate::domain::returns::CloseToClose;
use crate::domain::table::TimeSeriesTable;
use crate::domain::universe::{validate_universe, Universe};
use crate::domain::window::{WindowPartitioner, WindowSpec};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{BarSourcePort, BarStorePort, PriceDataPort};

#[derive(Parser, Debug)]
#[command(name = "rollingbt", about = "Rolling-window portfolio backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a rolling-window backtest over the stored closes
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Override `[backtest] strategy`
        #[arg(short, long)]
        strategy: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Import per-ticker CSV bar files into the store
    Import {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory holding `<TICKER>.csv` files
        #[arg(long)]
        source: PathBuf,
    },
    /// Show the stored data range for each configured ticker
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Everything a backtest needs from the config file.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub windows: WindowSpec,
    pub tickers: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub strategy: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub bars_read: usize,
    pub rows_written: usize,
    pub failed: Vec<String>,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            strategy,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, strategy.as_deref())
            } else {
                run_backtest_command(&config, strategy.as_deref())
            }
        }
        Command::Import { config, source } => run_import(&config, &source),
        Command::Info { config } => run_info(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = BacktestError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(e: BacktestError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

/// Read and validate every backtest setting. Relative paths resolve
/// against `base_dir`.
pub fn read_run_settings(
    config: &dyn ConfigPort,
    base_dir: &Path,
    strategy_override: Option<&str>,
) -> Result<RunSettings, BacktestError> {
    let windows = read_window_spec(config)?;
    let (start_date, end_date) = read_date_range(config)?;
    let strategy = read_strategy_name(config, strategy_override)?;
    let tickers = read_tickers(config, base_dir)?;
    Ok(RunSettings {
        windows,
        tickers,
        start_date,
        end_date,
        strategy,
    })
}

pub fn build_backtest_config(
    windows: WindowSpec,
    tickers: Vec<String>,
) -> Result<BacktestConfig, BacktestError> {
    Ok(BacktestConfig {
        windows,
        universe: Universe::new(tickers)?,
    })
}

fn resolve_strategy(name: &str) -> Result<Box<dyn AllocationStrategy>, BacktestError> {
    strategy_from_name(name).ok_or_else(|| BacktestError::ConfigInvalid {
        section: "backtest".into(),
        key: "strategy".into(),
        reason: format!("unknown strategy '{}'", name),
    })
}

/// Load closes for the usable part of the universe and run the driver.
pub fn run_backtest_pipeline(
    data_port: &dyn PriceDataPort,
    settings: &RunSettings,
    strategy: &dyn AllocationStrategy,
) -> Result<BacktestResult, BacktestError> {
    let validation = validate_universe(
        data_port,
        settings.tickers.clone(),
        settings.start_date,
        settings.end_date,
    )?;
    if !validation.skipped.is_empty() {
        warn!(skipped = ?validation.skipped, "tickers without data dropped from universe");
    }
    let universe = validation.universe;

    let records =
        data_port.fetch_closes(universe.tickers(), settings.start_date, settings.end_date)?;
    let table = TimeSeriesTable::from_records(records, universe.clone())?;
    info!(
        tickers = universe.len(),
        dates = table.num_dates(),
        rows = table.num_rows(),
        "loaded price table"
    );

    let config = BacktestConfig {
        windows: settings.windows,
        universe,
    };
    run_backtest(&table, &config, strategy, &CloseToClose)
}

fn run_backtest_command(config_path: &Path, strategy_override: Option<&str>) -> ExitCode {
    info!(path = %config_path.display(), "loading config");
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let settings = match read_run_settings(&adapter, adapter.base_dir(), strategy_override) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let strategy = match resolve_strategy(&settings.strategy) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let store = match SqliteAdapter::from_config(&adapter, adapter.base_dir()) {
            Ok(s) => s,
            Err(e) => return fail(e),
        };

        info!(
            strategy = strategy.name(),
            allocation = settings.windows.allocation_len,
            evaluation = settings.windows.evaluation_len,
            stride = settings.windows.stride,
            "running backtest"
        );
        let result = match run_backtest_pipeline(&store, &settings, strategy.as_ref()) {
            Ok(r) => r,
            Err(e) => return fail(e),
        };

        let metrics = Metrics::compute(&result, settings.windows.evaluation_len - 1);
        print_report(&result, &metrics, strategy.name());
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = strategy;
        eprintln!("error: sqlite feature is required for backtest");
        ExitCode::from(1)
    }
}

fn print_report(result: &BacktestResult, metrics: &Metrics, strategy: &str) {
    println!("=== Windows ({}) ===", strategy);
    for outcome in &result.history {
        println!(
            "{:>4}  alloc {}  eval {}  {}  {:+.2}%  x{:.4}",
            outcome.index,
            outcome.allocation_window,
            outcome.evaluation_window,
            outcome.allocation,
            outcome.realized.portfolio() * 100.0,
            outcome.portfolio_factor,
        );
    }

    println!("\n=== Running Returns ===");
    for (key, factor) in result.running.iter() {
        println!("  {:<12} {:.6}", key.to_string(), factor);
    }

    println!("\n=== Summary ===");
    println!("Windows:          {}", metrics.windows);
    println!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    println!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    println!("Mean / Window:    {:.3}%", metrics.mean_window_return * 100.0);
    println!("Volatility:       {:.3}%", metrics.window_volatility * 100.0);
    println!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    println!(
        "Max Drawdown:     -{:.1}% ({} windows)",
        metrics.max_drawdown * 100.0,
        metrics.max_drawdown_windows
    );
    println!(
        "Win Rate:         {:.1}% ({} up, {} down)",
        metrics.win_rate * 100.0,
        metrics.windows_won,
        metrics.windows_lost
    );
    println!("Best Window:      {:+.2}%", metrics.best_window * 100.0);
    println!("Worst Window:     {:+.2}%", metrics.worst_window * 100.0);
}

pub fn run_dry_run(config_path: &Path, strategy_override: Option<&str>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let settings = match read_run_settings(&adapter, adapter.base_dir(), strategy_override) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    if let Err(e) = build_backtest_config(settings.windows, settings.tickers.clone()) {
        return fail(e);
    }
    eprintln!("Config validated successfully");

    let w = settings.windows;
    eprintln!("\nWindows:");
    eprintln!("  allocation: {} dates", w.allocation_len);
    eprintln!("  evaluation: {} dates", w.evaluation_len);
    eprintln!("  stride:     {} dates", w.stride);
    eprintln!("  span:       {} dates per pair", w.span());
    eprintln!("\nStrategy: {}", settings.strategy);
    eprintln!("\nUniverse ({} tickers):", settings.tickers.len());
    eprintln!("  {}", settings.tickers.join(", "));
    if settings.start_date.is_some() || settings.end_date.is_some() {
        let show = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        eprintln!(
            "\nDate range: {} to {}",
            show(settings.start_date),
            show(settings.end_date)
        );
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

/// Number of window pairs a table of `num_dates` dates would yield.
pub fn planned_windows(windows: WindowSpec, num_dates: usize) -> Result<usize, BacktestError> {
    Ok(WindowPartitioner::new(windows, num_dates)?.count())
}

/// Copy bars newer than the store's last date from `source` into `store`.
///
/// A ticker whose source fails is logged and skipped; store failures abort.
pub fn import_bars(
    source: &dyn BarSourcePort,
    store: &dyn BarStorePort,
    tickers: &[String],
) -> Result<ImportSummary, BacktestError> {
    let resume_from = store.last_date()?.and_then(|d| d.succ_opt());
    if let Some(from) = resume_from {
        info!(%from, "resuming import after last stored date");
    }

    let mut summary = ImportSummary::default();
    for ticker in tickers {
        let bars = match source.fetch_bars(ticker, resume_from, None) {
            Ok(b) => b,
            Err(e) => {
                warn!(%ticker, error = %e, "skipping ticker");
                summary.failed.push(ticker.clone());
                continue;
            }
        };
        let written = store.insert_bars(&bars)?;
        info!(%ticker, read = bars.len(), written, "imported bars");
        summary.bars_read += bars.len();
        summary.rows_written += written;
    }
    Ok(summary)
}

fn run_import(config_path: &Path, source_dir: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let tickers = match read_tickers(&config, config.base_dir()) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::csv_adapter::CsvAdapter;
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let store = match SqliteAdapter::from_config(&config, config.base_dir()) {
            Ok(s) => s,
            Err(e) => return fail(e),
        };
        let source = CsvAdapter::new(source_dir.to_path_buf());

        match import_bars(&source, &store, &tickers) {
            Ok(summary) => {
                eprintln!(
                    "Imported {} new rows ({} bars read) for {} tickers",
                    summary.rows_written,
                    summary.bars_read,
                    tickers.len() - summary.failed.len()
                );
                if !summary.failed.is_empty() {
                    eprintln!("Skipped: {}", summary.failed.join(", "));
                }
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        }
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = (tickers, source_dir);
        eprintln!("error: sqlite feature is required for import");
        ExitCode::from(1)
    }
}

/// Tickers `info` reports on: the configured universe, or every stored
/// ticker when the config has no `[universe]`.
pub fn info_tickers(
    config: &dyn ConfigPort,
    base_dir: &Path,
    store: &dyn PriceDataPort,
) -> Result<Vec<String>, BacktestError> {
    match read_tickers(config, base_dir) {
        Err(BacktestError::ConfigMissing { section, .. }) if section == "universe" => {
            store.list_tickers()
        }
        other => other,
    }
}

fn run_info(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let store = match SqliteAdapter::from_config(&config, config.base_dir()) {
            Ok(s) => s,
            Err(e) => return fail(e),
        };
        let tickers = match info_tickers(&config, config.base_dir(), &store) {
            Ok(t) => t,
            Err(e) => return fail(e),
        };
        if tickers.is_empty() {
            eprintln!("store is empty");
            return ExitCode::SUCCESS;
        }

        for ticker in &tickers {
            match store.get_data_range(ticker) {
                Ok(Some((first, last, count))) => {
                    println!("{}: {} rows, {} to {}", ticker, count, first, last);
                }
                Ok(None) => eprintln!("{}: no data found", ticker),
                Err(e) => eprintln!("error querying {}: {}", ticker, e),
            }
        }

        if let Ok(windows) = read_window_spec(&config) {
            match store
                .fetch_closes(&tickers, None, None)
                .and_then(|records| TimeSeriesTable::from_records(records, Universe::new(tickers)?))
            {
                Ok(table) => match planned_windows(windows, table.num_dates()) {
                    Ok(n) => println!("{} dates stored, {} window pairs", table.num_dates(), n),
                    Err(e) => eprintln!("{}", e),
                },
                Err(e) => eprintln!("cannot build price table: {}", e),
            }
        }
        ExitCode::SUCCESS
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config;
        eprintln!("error: sqlite feature is required for info");
        ExitCode::from(1)
    }
}

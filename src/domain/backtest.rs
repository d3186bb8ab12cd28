//! Rolling-window backtest driver.
//!
//! The driver is a small state machine:
//!
//! ```text
//! Init -> Windowing -> Scoring -> Compounding -> Windowing ... -> Done
//! ```
//!
//! Each [`BacktestDriver::step`] performs one transition, so a host can stop
//! between iterations. [`BacktestDriver::run`] steps until `Done`. Any error
//! halts the run and no result is produced.

use crate::domain::allocation::{validate_allocation, Allocation, AllocationStrategy};
use crate::domain::compounder::{compound, RunningReturn};
use crate::domain::error::{BacktestError, WindowBounds};
use crate::domain::returns::{ReturnCalculator, ReturnResult};
use crate::domain::table::TimeSeriesTable;
use crate::domain::universe::Universe;
use crate::domain::window::{WindowPair, WindowPartitioner, WindowSpec, Windows};
use chrono::NaiveDate;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktestConfig {
    pub windows: WindowSpec,
    pub universe: Universe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Init,
    Windowing,
    Scoring,
    Compounding,
    Done,
}

/// Everything observed for one processed window pair.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutcome {
    pub index: usize,
    pub allocation_window: WindowBounds,
    pub evaluation_window: WindowBounds,
    pub allocation: Allocation,
    pub realized: ReturnResult,
    /// Portfolio factor after this window was compounded.
    pub portfolio_factor: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub running: RunningReturn,
    pub history: Vec<WindowOutcome>,
}

impl BacktestResult {
    /// Portfolio factor at the end of each evaluation window.
    pub fn curve(&self) -> Vec<(NaiveDate, f64)> {
        self.history
            .iter()
            .map(|o| (o.evaluation_window.last, o.portfolio_factor))
            .collect()
    }

    pub fn window_count(&self) -> usize {
        self.history.len()
    }
}

struct Scored {
    pair: WindowPair,
    allocation_window: WindowBounds,
    evaluation_window: WindowBounds,
    allocation: Allocation,
    realized: ReturnResult,
}

pub struct BacktestDriver<'a> {
    table: &'a TimeSeriesTable,
    config: &'a BacktestConfig,
    strategy: &'a dyn AllocationStrategy,
    calculator: &'a dyn ReturnCalculator,
    state: DriverState,
    windows: Option<Windows>,
    pending: Option<WindowPair>,
    scored: Option<Scored>,
    running: RunningReturn,
    history: Vec<WindowOutcome>,
    failed: bool,
}

impl<'a> BacktestDriver<'a> {
    pub fn new(
        table: &'a TimeSeriesTable,
        config: &'a BacktestConfig,
        strategy: &'a dyn AllocationStrategy,
        calculator: &'a dyn ReturnCalculator,
    ) -> Self {
        Self {
            table,
            config,
            strategy,
            calculator,
            state: DriverState::Init,
            windows: None,
            pending: None,
            scored: None,
            running: RunningReturn::new(&config.universe),
            history: Vec::new(),
            failed: false,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Outcomes recorded so far, in window order.
    pub fn history(&self) -> &[WindowOutcome] {
        &self.history
    }

    /// Perform one transition and return the new state.
    ///
    /// On error the driver is halted: the state becomes `Done` and
    /// [`into_result`](Self::into_result) yields nothing.
    pub fn step(&mut self) -> Result<DriverState, BacktestError> {
        let next = match self.state {
            DriverState::Init => self.init(),
            DriverState::Windowing => Ok(self.next_window()),
            DriverState::Scoring => self.score(),
            DriverState::Compounding => Ok(self.compound()),
            DriverState::Done => Ok(DriverState::Done),
        };
        match next {
            Ok(state) => {
                trace!(from = ?self.state, to = ?state, "driver transition");
                self.state = state;
                Ok(state)
            }
            Err(e) => {
                self.failed = true;
                self.state = DriverState::Done;
                Err(e)
            }
        }
    }

    /// Step until `Done` and return the result.
    pub fn run(mut self) -> Result<BacktestResult, BacktestError> {
        // any failure already returned through `?`, so `Done` here is clean
        while self.step()? != DriverState::Done {}
        info!(
            windows = self.history.len(),
            portfolio = self.running.portfolio(),
            "backtest complete"
        );
        Ok(BacktestResult {
            running: self.running,
            history: self.history,
        })
    }

    /// The final result, only after a run that reached `Done` without error.
    pub fn into_result(self) -> Option<BacktestResult> {
        if self.state != DriverState::Done || self.failed {
            return None;
        }
        Some(BacktestResult {
            running: self.running,
            history: self.history,
        })
    }

    fn init(&mut self) -> Result<DriverState, BacktestError> {
        if self.table.universe() != &self.config.universe {
            return Err(BacktestError::DataFormat {
                reason: format!(
                    "table tickers {:?} do not match configured universe {:?}",
                    self.table.universe().tickers(),
                    self.config.universe.tickers()
                ),
            });
        }
        let partitioner = WindowPartitioner::new(self.config.windows, self.table.num_dates())?;
        info!(
            dates = self.table.num_dates(),
            tickers = self.config.universe.len(),
            windows = partitioner.count(),
            strategy = self.strategy.name(),
            "starting backtest"
        );
        self.windows = Some(partitioner.windows());
        Ok(DriverState::Windowing)
    }

    fn next_window(&mut self) -> DriverState {
        match self.windows.as_mut().and_then(Iterator::next) {
            Some(pair) => {
                self.pending = Some(pair);
                DriverState::Scoring
            }
            None => DriverState::Done,
        }
    }

    fn score(&mut self) -> Result<DriverState, BacktestError> {
        let Some(pair) = self.pending.take() else {
            return Ok(DriverState::Windowing);
        };
        let allocation_slice = self.table.slice(pair.allocation.clone())?;
        let evaluation_slice = self.table.slice(pair.evaluation.clone())?;

        let allocation = self.strategy.allocate(&allocation_slice)?;
        validate_allocation(&allocation_slice, &allocation, self.strategy.allows_shorting())?;
        let realized = self.calculator.score(&evaluation_slice, &allocation)?;

        debug!(
            window = pair.index,
            past = %allocation_slice.bounds(),
            future = %evaluation_slice.bounds(),
            %allocation,
            portfolio = realized.portfolio(),
            "window scored"
        );

        self.scored = Some(Scored {
            allocation_window: allocation_slice.bounds(),
            evaluation_window: evaluation_slice.bounds(),
            pair,
            allocation,
            realized,
        });
        Ok(DriverState::Compounding)
    }

    fn compound(&mut self) -> DriverState {
        if let Some(scored) = self.scored.take() {
            let running = &mut self.running;
            compound(running, &scored.realized);
            self.history.push(WindowOutcome {
                index: scored.pair.index,
                allocation_window: scored.allocation_window,
                evaluation_window: scored.evaluation_window,
                allocation: scored.allocation,
                realized: scored.realized,
                portfolio_factor: running.portfolio(),
            });
        }
        DriverState::Windowing
    }
}

/// Run a full backtest over `table`.
pub fn run_backtest(
    table: &TimeSeriesTable,
    config: &BacktestConfig,
    strategy: &dyn AllocationStrategy,
    calculator: &dyn ReturnCalculator,
) -> Result<BacktestResult, BacktestError> {
    BacktestDriver::new(table, config, strategy, calculator).run()
}

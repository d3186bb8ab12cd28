//! Summary statistics over a finished rolling backtest.

use super::backtest::BacktestResult;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub windows: usize,
    pub total_return: f64,
    pub annualized_return: f64,
    pub mean_window_return: f64,
    pub window_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_windows: usize,
    pub windows_won: usize,
    pub windows_lost: usize,
    pub win_rate: f64,
    pub best_window: f64,
    pub worst_window: f64,
}

impl Metrics {
    /// `holding_days` is the number of trading days one window's return spans
    /// (evaluation length minus one); it scales the annualized figures.
    pub fn compute(result: &BacktestResult, holding_days: usize) -> Self {
        let returns: Vec<f64> = result
            .history
            .iter()
            .map(|o| o.realized.portfolio())
            .collect();
        let factors: Vec<f64> = result.history.iter().map(|o| o.portfolio_factor).collect();

        let windows = returns.len();
        let total_return = result.running.portfolio() - 1.0;

        let periods_per_year = if holding_days > 0 {
            TRADING_DAYS_PER_YEAR / holding_days as f64
        } else {
            0.0
        };
        let years = if periods_per_year > 0.0 {
            windows as f64 / periods_per_year
        } else {
            0.0
        };
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (mean_window_return, window_volatility) = mean_and_stddev(&returns);
        let sharpe_ratio = if window_volatility > 0.0 {
            mean_window_return / window_volatility * periods_per_year.sqrt()
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_windows) = compute_drawdown(&factors);

        let windows_won = returns.iter().filter(|r| **r > 0.0).count();
        let windows_lost = returns.iter().filter(|r| **r < 0.0).count();
        let win_rate = if windows > 0 {
            windows_won as f64 / windows as f64
        } else {
            0.0
        };

        let best_window = returns.iter().copied().fold(f64::NAN, f64::max);
        let worst_window = returns.iter().copied().fold(f64::NAN, f64::min);

        Metrics {
            windows,
            total_return,
            annualized_return,
            mean_window_return,
            window_volatility,
            sharpe_ratio,
            max_drawdown,
            max_drawdown_windows,
            windows_won,
            windows_lost,
            win_rate,
            best_window: if best_window.is_nan() { 0.0 } else { best_window },
            worst_window: if worst_window.is_nan() { 0.0 } else { worst_window },
        }
    }
}

fn mean_and_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Deepest peak-to-trough fall of the factor curve, and the longest run of
/// windows spent below a prior peak. The curve implicitly starts at 1.0.
fn compute_drawdown(factors: &[f64]) -> (f64, usize) {
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut duration = 0usize;

    for &factor in factors {
        if factor >= peak {
            peak = factor;
            duration = 0;
        } else if peak > 0.0 {
            let dd = (peak - factor) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
            duration += 1;
            if duration > max_duration {
                max_duration = duration;
            }
        }
    }

    (max_dd, max_duration)
}

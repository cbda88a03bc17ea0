// Performance metrics: equity curve statistics and realized-trade analytics

use chrono::NaiveDate;

use crate::backtesting::lot_book::ClosedTrade;

/// Annual risk-free rate backing the Sharpe ratio.
pub const ANNUAL_RISK_FREE: f64 = 0.05;
const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Portfolio total value sampled once per simulated day, in chronological
/// order.
#[derive(Debug, Clone, Default)]
pub struct EquityCurve {
    pub dates: Vec<NaiveDate>,
    pub equity: Vec<f64>,
}

impl EquityCurve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(&mut self, date: NaiveDate, equity: f64) {
        self.dates.push(date);
        self.equity.push(equity);
    }

    pub fn len(&self) -> usize {
        self.equity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.equity.is_empty()
    }

    /// Simple daily returns; one fewer entry than the curve.
    pub fn returns(&self) -> Vec<f64> {
        self.equity
            .windows(2)
            .map(|w| w[1] / w[0] - 1.0)
            .collect()
    }
}

/// Statistics computed from the equity series. NaN marks anything the series
/// cannot support (too short, flat, non-positive endpoints).
#[derive(Debug, Clone, Copy)]
pub struct ReturnStats {
    pub ann_vol: f64,
    pub sharpe: f64,
    pub cagr: f64,
    pub max_drawdown: f64,
    pub calmar: f64,
}

impl ReturnStats {
    pub fn nan() -> Self {
        Self {
            ann_vol: f64::NAN,
            sharpe: f64::NAN,
            cagr: f64::NAN,
            max_drawdown: f64::NAN,
            calmar: f64::NAN,
        }
    }
}

fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// Returns / Sharpe / CAGR / max-drawdown / Calmar for an equity curve.
pub fn compute_return_stats(curve: &EquityCurve) -> ReturnStats {
    if curve.len() < 2 {
        return ReturnStats::nan();
    }

    let returns = curve.returns();
    let ann_vol = sample_std(&returns) * TRADING_DAYS_PER_YEAR.sqrt();

    let rf_daily = ANNUAL_RISK_FREE / TRADING_DAYS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - rf_daily).collect();
    let excess_std = sample_std(&excess);
    let sharpe = if excess_std.is_nan() || excess_std == 0.0 {
        f64::NAN
    } else {
        let mean = excess.iter().sum::<f64>() / excess.len() as f64;
        (mean / excess_std) * TRADING_DAYS_PER_YEAR.sqrt()
    };

    let start = curve.equity[0];
    let end = curve.equity[curve.len() - 1];
    let span_days = (curve.dates[curve.len() - 1] - curve.dates[0]).num_days();
    let years = span_days as f64 / 365.25;
    let cagr = if years > 0.0 && start > 0.0 && end > 0.0 {
        (end / start).powf(1.0 / years) - 1.0
    } else {
        f64::NAN
    };

    let mut peak = f64::NEG_INFINITY;
    let mut max_drawdown = 0.0f64;
    for &e in &curve.equity {
        peak = peak.max(e);
        if peak > 0.0 {
            max_drawdown = max_drawdown.min(e / peak - 1.0);
        }
    }

    let calmar = if !cagr.is_nan() && max_drawdown < 0.0 {
        cagr / max_drawdown.abs()
    } else {
        f64::NAN
    };

    ReturnStats {
        ann_vol,
        sharpe,
        cagr,
        max_drawdown,
        calmar,
    }
}

/// Closed-trade analytics. `win_rate`/`avg_realized_pnl`/`profit_factor` are
/// NaN when there is nothing to aggregate (no trades, or no losing trades
/// for the profit factor).
#[derive(Debug, Clone, Copy)]
pub struct RealizedStats {
    pub n_trades: usize,
    pub win_rate: f64,
    pub avg_realized_pnl: f64,
    pub profit_factor: f64,
}

pub fn realized_stats(trades: &[ClosedTrade]) -> RealizedStats {
    let n = trades.len();
    if n == 0 {
        return RealizedStats {
            n_trades: 0,
            win_rate: f64::NAN,
            avg_realized_pnl: f64::NAN,
            profit_factor: f64::NAN,
        };
    }

    let wins: f64 = trades
        .iter()
        .filter(|t| t.realized_pnl > 0.0)
        .map(|t| t.realized_pnl)
        .sum();
    let losses: f64 = trades
        .iter()
        .filter(|t| t.realized_pnl < 0.0)
        .map(|t| t.realized_pnl)
        .sum();
    let n_wins = trades.iter().filter(|t| t.realized_pnl > 0.0).count();

    let total: f64 = trades.iter().map(|t| t.realized_pnl).sum();
    let profit_factor = if losses != 0.0 {
        wins / losses.abs()
    } else {
        f64::NAN
    };

    RealizedStats {
        n_trades: n,
        win_rate: n_wins as f64 / n as f64,
        avg_realized_pnl: total / n as f64,
        profit_factor,
    }
}

/// One row of the performance report. Per-ticker rows leave the portfolio
/// columns NaN; the `_PORTFOLIO_` row fills them.
#[derive(Debug, Clone)]
pub struct PerfRow {
    pub ticker: String,
    pub n_trades: usize,
    pub win_rate: f64,
    pub realized_pnl: f64,
    pub pnl: f64,
    pub avg_realized_pnl: f64,
    pub profit_factor: f64,
    pub remaining_share_value: f64,
    pub final_cash: f64,
    pub final_equity: f64,
    pub cagr: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub calmar: f64,
}

/// Row id of the portfolio aggregate.
pub const PORTFOLIO_ROW: &str = "_PORTFOLIO_";

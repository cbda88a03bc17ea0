// Grid search over (short, long) SMA window pairs against a composite
// training-set objective

use chrono::NaiveDate;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::backtesting::engine::run_backtest;
use crate::backtesting::executor::Side;
use crate::backtesting::selector::SmaParams;
use crate::config::{BacktestConfig, TradePenaltyMode};
use crate::error::{EngineError, Result};
use crate::market_data::Universe;

// Objective weights: Sharpe, profit factor, |max drawdown|, win rate.
const W_SHARPE: f64 = 1.0;
const W_PROFIT_FACTOR: f64 = 0.5;
const W_MAX_DRAWDOWN: f64 = 2.0;
const W_WIN_RATE: f64 = 0.5;

/// Find the best (short, long) pair over the training slice of `universe`
/// (bars dated at or before `train_end`).
///
/// Pairs are enumerated short-ascending then long-ascending; candidates
/// whose long window cannot fill on any ticker are skipped. Each surviving
/// pair is backtested (in parallel — grid points share only the read-only
/// training slice) and scored
///   J = 1.0·Sharpe + 0.5·ProfitFactor − 2.0·|MaxDD| + 0.5·WinRate,
/// with the `min_trades` penalty applied per `trade_penalty_mode`. A NaN
/// score is a rejected candidate. The best finite score wins, ties going to
/// the earliest pair in enumeration order; `OptimizerNoGrid` when nothing
/// scored.
pub fn optimize_sma(
    universe: &Universe,
    train_end: NaiveDate,
    short_grid: &[usize],
    long_grid: &[usize],
    config: &BacktestConfig,
) -> Result<(usize, usize)> {
    let train: Universe = universe
        .iter()
        .map(|(t, s)| (t.clone(), s.through(train_end)))
        .collect();

    if train.values().all(|s| s.is_empty()) {
        return Err(EngineError::input(
            "no training data available up to train_end — check train_end or inputs",
        ));
    }

    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for &s in short_grid {
        for &l in long_grid {
            if s >= l {
                continue; // the short window must be the shorter one
            }
            if !train.values().any(|series| series.len() >= l + 1) {
                debug!("skipping s={} l={}: insufficient history", s, l);
                continue;
            }
            pairs.push((s, l));
        }
    }

    let scored: Vec<Option<f64>> = pairs
        .par_iter()
        .map(|&(s, l)| evaluate_grid_point(&train, s, l, config))
        .collect();

    let mut best: Option<(usize, f64)> = None;
    for (idx, score) in scored.iter().enumerate() {
        let score = match score {
            Some(j) if j.is_finite() => *j,
            _ => continue,
        };
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((idx, score)),
        }
    }

    match best {
        Some((idx, _)) => Ok(pairs[idx]),
        None => Err(EngineError::OptimizerNoGrid),
    }
}

/// Backtest one grid point and score it; None when the run itself failed.
fn evaluate_grid_point(
    train: &Universe,
    s: usize,
    l: usize,
    config: &BacktestConfig,
) -> Option<f64> {
    let params: SmaParams = train.keys().map(|t| (t.clone(), (s, l))).collect();

    let report = match run_backtest(train, &params, config) {
        Ok(r) => r,
        Err(e) => {
            warn!("backtest error for s={} l={}: {}", s, l, e);
            return None;
        }
    };

    let n_trades = if report.closed_trades.is_empty() {
        report
            .events
            .iter()
            .filter(|e| e.side == Side::Sell)
            .count()
    } else {
        report.closed_trades.len()
    };

    let row = report.portfolio_row()?;
    let mut score = W_SHARPE * row.sharpe + W_PROFIT_FACTOR * row.profit_factor
        - W_MAX_DRAWDOWN * row.max_drawdown.abs()
        + W_WIN_RATE * row.win_rate;

    let mut note = String::new();
    if n_trades < config.min_trades {
        match config.trade_penalty_mode {
            TradePenaltyMode::Reject => {
                score = f64::NAN;
                note = format!("too_few_trades<{}", config.min_trades);
            }
            TradePenaltyMode::Scale => {
                score *= n_trades as f64 / config.min_trades as f64;
                note = format!("penalty_trades({}/{})", n_trades, config.min_trades);
            }
        }
    }

    info!(
        "grid s={} l={} score={:.6} trades={} {}",
        s, l, score, n_trades, note
    );
    Some(score)
}

/// Optimize each ticker against its own history, falling back to
/// `fallback_params` when a ticker cannot be optimized.
pub fn optimize_sma_per_ticker(
    universe: &Universe,
    train_end: NaiveDate,
    short_grid: &[usize],
    long_grid: &[usize],
    config: &BacktestConfig,
    fallback_params: (usize, usize),
) -> SmaParams {
    let mut per_ticker = SmaParams::new();

    for (ticker, series) in universe {
        let singleton: Universe =
            std::iter::once((ticker.clone(), series.clone())).collect();

        match optimize_sma(&singleton, train_end, short_grid, long_grid, config) {
            Ok(best) => {
                info!("ticker {} optimized -> s={} l={}", ticker, best.0, best.1);
                per_ticker.insert(ticker.clone(), best);
            }
            Err(e) => {
                warn!(
                    "optimize failed for {}: {}. Using fallback {:?}",
                    ticker, e, fallback_params
                );
                per_ticker.insert(ticker.clone(), fallback_params);
            }
        }
    }

    per_ticker
}

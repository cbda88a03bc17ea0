// Engine runner: optimize per-ticker SMA windows on the training split,
// backtest the validation split, export the ledgers

use std::collections::BTreeSet;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use log::{error, info};

use goldencross::backtesting::engine::run_backtest;
use goldencross::backtesting::selector::DEFAULT_SMA;
use goldencross::config::BacktestConfig;
use goldencross::market_data::{load_universe, Universe};
use goldencross::optimizer::optimize_sma_per_ticker;
use goldencross::trading_io::{
    export_daily_returns, export_per_trade_summary, export_performance_metrics,
    export_trade_history, load_per_ticker_params, save_per_ticker_params,
};

/// SMA-crossover backtester: per-ticker grid-optimized windows, daily
/// simulation with FIFO accounting, CSV/JSON exports.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Directory of per-ticker CSV files (Date,Open[,High,Low],Close)
    #[arg(long)]
    data_dir: PathBuf,

    /// Output directory for params and exports
    #[arg(long, default_value = "model_result")]
    out_dir: PathBuf,

    /// Fraction of the date range used for training
    #[arg(long, default_value_t = 0.7)]
    train_ratio: f64,

    /// Smallest long SMA window in the grid
    #[arg(long, default_value_t = 50)]
    long_min: usize,

    /// Largest long SMA window in the grid
    #[arg(long, default_value_t = 200)]
    long_max: usize,

    /// Step between long windows
    #[arg(long, default_value_t = 25)]
    long_step: usize,

    /// Re-run the optimizer even when saved params exist
    #[arg(long)]
    force_reoptimize: bool,
}

/// Long grid from the CLI bounds; short grid derived as 20% and 25% of each
/// long window, floored at 5.
fn build_grids(long_min: usize, long_max: usize, long_step: usize) -> (Vec<usize>, Vec<usize>) {
    let long_grid: Vec<usize> = (long_min..=long_max)
        .step_by(long_step.max(1))
        .collect();

    let mut shorts = BTreeSet::new();
    for &l in &long_grid {
        shorts.insert((l / 5).max(5));
        shorts.insert((l / 4).max(5));
    }
    (shorts.into_iter().collect(), long_grid)
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = BacktestConfig::default();

    let universe = load_universe(&cli.data_dir)?;

    // Train/validation split over the union of trading dates.
    let all_dates: Vec<NaiveDate> = universe
        .values()
        .flat_map(|s| s.bars().iter().map(|b| b.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if all_dates.is_empty() {
        return Err("universe contains no trading dates".into());
    }
    let split_idx = ((all_dates.len() as f64 * cli.train_ratio) as usize)
        .min(all_dates.len() - 1);
    let train_end = all_dates[split_idx];
    info!("train/validation split at {}", train_end);

    let validation: Universe = universe
        .iter()
        .map(|(t, s)| (t.clone(), s.after(train_end)))
        .filter(|(_, s)| !s.is_empty())
        .collect();
    if validation.is_empty() {
        return Err("no validation data after the train split — check ratio or data".into());
    }

    let (short_grid, long_grid) = build_grids(cli.long_min, cli.long_max, cli.long_step);

    let params_path = cli.out_dir.join("per_ticker_params.json");
    let mut params = None;
    if !cli.force_reoptimize {
        params = load_per_ticker_params(&params_path);
    }
    let params = match params {
        Some(p) => p,
        None => {
            info!("no saved params or reoptimize requested -> running per-ticker grid search");
            let optimized = optimize_sma_per_ticker(
                &universe,
                train_end,
                &short_grid,
                &long_grid,
                &config,
                DEFAULT_SMA,
            );
            if let Err(e) = save_per_ticker_params(&optimized, &params_path) {
                error!("failed to save per-ticker params to {}: {}", params_path.display(), e);
            }
            optimized
        }
    };
    info!("per-ticker SMA params ready for {} tickers", params.len());

    let report = run_backtest(&validation, &params, &config)?;

    export_trade_history(&report.events, &cli.out_dir.join("trade_history.csv"))?;
    export_performance_metrics(&report.perf, &cli.out_dir.join("performance.csv"))?;
    if report.closed_trades.is_empty() {
        info!("no per-trades to save");
    } else {
        export_per_trade_summary(
            &report.closed_trades,
            &cli.out_dir.join("per_trade_summary.csv"),
        )?;
    }
    if report.equity_curve.is_empty() {
        info!("no equity curve available for daily returns export");
    } else {
        export_daily_returns(
            &report.equity_curve,
            &cli.out_dir.join("portfolio_daily_returns.csv"),
        )?;
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

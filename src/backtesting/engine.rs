// Simulation driver - the master daily loop composing signals, selection,
// execution, FIFO accounting and equity tracking

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use log::info;

use crate::backtesting::executor::{execute_orders, Portfolio, TradeEvent};
use crate::backtesting::lot_book::{ClosedTrade, LotBook};
use crate::backtesting::metrics::{
    compute_return_stats, realized_stats, EquityCurve, PerfRow, ReturnStats, PORTFOLIO_ROW,
};
use crate::backtesting::selector::{
    params_for, select_stocks_to_buy, select_stocks_to_sell, SmaParams,
};
use crate::config::BacktestConfig;
use crate::error::Result;
use crate::market_data::Universe;
use crate::signals::indicators::compute_atr;
use crate::signals::{generate_signals, SignalFrame};

/// Everything a backtest run produces: the chronological event ledger, the
/// FIFO-paired per-trade ledger, the daily equity curve and the performance
/// table (per ticker plus the `_PORTFOLIO_` aggregate).
#[derive(Debug)]
pub struct BacktestReport {
    pub events: Vec<TradeEvent>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: EquityCurve,
    pub perf: Vec<PerfRow>,
}

impl BacktestReport {
    pub fn portfolio_row(&self) -> Option<&PerfRow> {
        self.perf.iter().find(|r| r.ticker == PORTFOLIO_ROW)
    }
}

/// Run the day-by-day simulation over `universe` with per-ticker SMA
/// windows from `params` (missing tickers fall back to the default pair).
///
/// Within a day, sells execute before buys so freed cash is available to
/// the buy selector; order within each side follows the selector's ranking.
/// Equity is sampled exactly once per trading day, after that day's orders.
pub fn run_backtest(
    universe: &Universe,
    params: &SmaParams,
    config: &BacktestConfig,
) -> Result<BacktestReport> {
    // Signals and ATR are deterministic per ticker; compute them once.
    let mut signals_map: BTreeMap<String, SignalFrame> = BTreeMap::new();
    let mut atr_map: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (ticker, series) in universe {
        let (short_w, long_w) = params_for(params, ticker);
        signals_map.insert(
            ticker.clone(),
            generate_signals(&series.closes(), short_w, long_w),
        );
        atr_map.insert(ticker.clone(), compute_atr(series, config.atr_period));
    }

    let all_dates: BTreeSet<NaiveDate> = universe
        .values()
        .flat_map(|s| s.bars().iter().map(|b| b.date))
        .collect();

    let mut portfolio = Portfolio::new(config.initial_cash);
    let mut events: Vec<TradeEvent> = Vec::new();
    let mut equity_curve = EquityCurve::new();

    for &date in &all_dates {
        let mut price_map: HashMap<String, f64> = HashMap::new();
        let mut signals_today: BTreeMap<String, i8> = BTreeMap::new();
        for (ticker, series) in universe {
            if let Some(idx) = series.index_of(date) {
                price_map.insert(ticker.clone(), series.bars()[idx].open);
                if let Some(frame) = signals_map.get(ticker) {
                    signals_today.insert(ticker.clone(), frame.signal[idx]);
                }
            }
        }

        // Sells first: freed cash funds the same day's buys.
        let sell_orders = select_stocks_to_sell(
            &portfolio.positions,
            &price_map,
            &signals_today,
            &portfolio.last_buy_price,
            config,
        );
        let sell_events = execute_orders(&mut portfolio, &sell_orders, &price_map, date, config)?;
        events.extend(sell_events);

        let has_buy_signal = signals_today.values().any(|&s| s == 1);
        if has_buy_signal {
            let mut buy_orders = select_stocks_to_buy(
                date,
                universe,
                &signals_today,
                portfolio.cash,
                params,
                &atr_map,
                config,
            );

            if let Some(cap) = config.max_positions_in_portfolio {
                let open = portfolio.open_position_count();
                let slots = cap.saturating_sub(open);
                buy_orders.truncate(slots);
            }

            let buy_events =
                execute_orders(&mut portfolio, &buy_orders, &price_map, date, config)?;
            events.extend(buy_events);
        }

        // Daily equity sample: cash plus positions marked at today's open,
        // falling back to the last known open for tickers not trading today.
        let mut total_value = portfolio.cash;
        for (ticker, &shares) in &portfolio.positions {
            if shares <= 0.0 {
                continue;
            }
            let price = match price_map.get(ticker) {
                Some(&p) => p,
                None => universe
                    .get(ticker)
                    .map(|s| s.last_open_at_or_before(date))
                    .unwrap_or(f64::NAN),
            };
            if price.is_nan() {
                continue;
            }
            total_value += shares * price;
        }
        equity_curve.add_point(date, total_value);
    }

    let (book, closed_trades) = LotBook::replay(&events);
    info!(
        "events: {} | per-trade pairs: {}",
        events.len(),
        closed_trades.len()
    );

    let perf = build_perf_rows(
        universe,
        &book,
        &closed_trades,
        &equity_curve,
        portfolio.cash,
        all_dates.iter().next_back().copied(),
    );

    Ok(BacktestReport {
        events,
        closed_trades,
        equity_curve,
        perf,
    })
}

fn build_perf_rows(
    universe: &Universe,
    book: &LotBook,
    closed_trades: &[ClosedTrade],
    equity_curve: &EquityCurve,
    final_cash: f64,
    last_date: Option<NaiveDate>,
) -> Vec<PerfRow> {
    let (unrealized_by_ticker, market_value_by_ticker) = match last_date {
        Some(d) => book.mark_to_market(universe, d),
        None => (HashMap::new(), HashMap::new()),
    };

    let mut by_ticker: BTreeMap<&str, Vec<ClosedTrade>> = BTreeMap::new();
    for trade in closed_trades {
        by_ticker
            .entry(trade.ticker.as_str())
            .or_default()
            .push(trade.clone());
    }

    let mut rows = Vec::with_capacity(universe.len() + 1);
    for ticker in universe.keys() {
        let group = by_ticker.get(ticker.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let stats = realized_stats(group);
        let realized: f64 = group.iter().map(|t| t.realized_pnl).sum();
        let unrealized = unrealized_by_ticker.get(ticker).copied().unwrap_or(0.0);

        rows.push(PerfRow {
            ticker: ticker.clone(),
            n_trades: stats.n_trades,
            win_rate: stats.win_rate,
            realized_pnl: realized,
            pnl: realized + unrealized,
            avg_realized_pnl: stats.avg_realized_pnl,
            profit_factor: stats.profit_factor,
            remaining_share_value: market_value_by_ticker.get(ticker).copied().unwrap_or(0.0),
            final_cash: f64::NAN,
            final_equity: f64::NAN,
            cagr: f64::NAN,
            sharpe: f64::NAN,
            max_drawdown: f64::NAN,
            calmar: f64::NAN,
        });
    }

    let final_mark: f64 = market_value_by_ticker.values().sum();
    let total_realized: f64 = closed_trades.iter().map(|t| t.realized_pnl).sum();
    let total_unrealized: f64 = unrealized_by_ticker.values().sum();

    let stats = if equity_curve.is_empty() {
        ReturnStats::nan()
    } else {
        compute_return_stats(equity_curve)
    };
    let realized = realized_stats(closed_trades);

    rows.push(PerfRow {
        ticker: PORTFOLIO_ROW.to_string(),
        n_trades: realized.n_trades,
        win_rate: realized.win_rate,
        realized_pnl: total_realized,
        pnl: total_realized + total_unrealized,
        avg_realized_pnl: realized.avg_realized_pnl,
        profit_factor: realized.profit_factor,
        remaining_share_value: final_mark,
        final_cash,
        final_equity: final_cash + final_mark,
        cagr: stats.cagr,
        sharpe: stats.sharpe,
        max_drawdown: stats.max_drawdown,
        calmar: stats.calmar,
    });

    rows
}

// End-to-end scenarios for the daily simulation loop

mod helpers;

use std::collections::HashMap;

use goldencross::backtesting::engine::run_backtest;
use goldencross::backtesting::executor::{execute_orders, OrderIntent, Portfolio, Side};
use goldencross::backtesting::lot_book::LotBook;
use goldencross::backtesting::selector::{select_stocks_to_sell, SmaParams};
use goldencross::config::{BacktestConfig, SizingMethod};
use goldencross::market_data::Universe;
use goldencross::signals::generate_signals;
use goldencross::signals::indicators::priority_score;

use helpers::{
    day, dip_then_trend, pop_then_crash, series_from_closes, sine_wave, universe_of, EPSILON,
};

fn all_in_config() -> BacktestConfig {
    BacktestConfig {
        sizing_method: SizingMethod::Fraction,
        fraction: 1.0,
        max_pct_per_ticker: 1.0,
        stop_loss_pct: 0.0,
        take_profit_pct: 0.0,
        fees_per_order: 0.0,
        ..BacktestConfig::default()
    }
}

fn sma(ticker: &str, short: usize, long: usize) -> SmaParams {
    let mut params = SmaParams::new();
    params.insert(ticker.to_string(), (short, long));
    params
}

#[test]
fn uptrend_produces_single_buy_and_no_sell() {
    let universe = universe_of(vec![series_from_closes("TREND", &dip_then_trend(300))]);
    let config = all_in_config();

    let report = run_backtest(&universe, &sma("TREND", 10, 50), &config).unwrap();

    let buys = report
        .events
        .iter()
        .filter(|e| e.side == Side::Buy)
        .count();
    let sells = report
        .events
        .iter()
        .filter(|e| e.side == Side::Sell)
        .count();

    assert_eq!(buys, 1, "expected exactly one entry on the resumed trend");
    assert_eq!(sells, 0, "no exit while the short SMA stays on top");

    let portfolio = report.portfolio_row().unwrap();
    assert!(portfolio.final_equity > config.initial_cash);
    assert_eq!(report.equity_curve.len(), 300);
}

#[test]
fn stop_loss_liquidates_with_bounded_loss() {
    let universe = universe_of(vec![series_from_closes("CRASH", &pop_then_crash(60))]);
    let config = BacktestConfig {
        stop_loss_pct: 0.05,
        take_profit_pct: 0.20,
        ..all_in_config()
    };

    let report = run_backtest(&universe, &sma("CRASH", 5, 20), &config).unwrap();

    let buy = report
        .events
        .iter()
        .find(|e| e.side == Side::Buy)
        .expect("the pop must trigger an entry");
    let sell = report
        .events
        .iter()
        .find(|e| e.side == Side::Sell)
        .expect("the crash must trigger the stop");

    // The stop fires at the first open at least 5% under the entry.
    assert!(sell.price <= buy.price * 0.95 + EPSILON);

    let stopped = &report.closed_trades[0];
    assert!(stopped.realized_pnl <= -0.05 * stopped.entry_price * stopped.shares + EPSILON);
    // Full liquidation, not a partial exit.
    assert_eq!(sell.shares, buy.shares);
}

#[test]
fn daily_slot_cap_buys_by_priority_order() {
    let n = 200;
    let closes_a = sine_wave(n, 40.0, 0.0);
    let closes_b = sine_wave(n, 40.0, std::f64::consts::PI);
    let universe = universe_of(vec![
        series_from_closes("AAA", &closes_a),
        series_from_closes("BBB", &closes_b),
    ]);

    let mut params = SmaParams::new();
    params.insert("AAA".to_string(), (5, 20));
    params.insert("BBB".to_string(), (5, 20));

    let config = BacktestConfig {
        max_positions_per_day: Some(1),
        fraction: 0.5,
        ..all_in_config()
    };

    let report = run_backtest(&universe, &params, &config).unwrap();

    // At most one entry per day under the cap.
    let mut buys_per_day: HashMap<_, Vec<&str>> = HashMap::new();
    for e in report.events.iter().filter(|e| e.side == Side::Buy) {
        buys_per_day.entry(e.date).or_default().push(&e.ticker);
    }
    assert!(!buys_per_day.is_empty());
    for (date, tickers) in &buys_per_day {
        assert_eq!(tickers.len(), 1, "multiple entries on {}", date);
    }

    // When both tickers signal together, the executed one must carry the
    // higher priority score.
    let frame_a = generate_signals(&closes_a, 5, 20);
    let frame_b = generate_signals(&closes_b, 5, 20);
    for i in 0..n {
        if frame_a.signal[i] == 1 && frame_b.signal[i] == 1 {
            if let Some(bought) = buys_per_day.get(&day(i)) {
                let score_a = priority_score(&closes_a[..=i], 5, 20, false);
                let score_b = priority_score(&closes_b[..=i], 5, 20, false);
                let winner = if score_a >= score_b { "AAA" } else { "BBB" };
                assert_eq!(bought[0], winner, "wrong pick on day {}", i);
            }
        }
    }
}

#[test]
fn empty_universe_yields_empty_report() {
    let config = all_in_config();
    let report = run_backtest(&Universe::new(), &SmaParams::new(), &config).unwrap();

    assert!(report.events.is_empty());
    assert!(report.closed_trades.is_empty());
    assert!(report.equity_curve.is_empty());

    let portfolio = report.portfolio_row().unwrap();
    assert_eq!(portfolio.final_cash, config.initial_cash);
    assert_eq!(portfolio.final_equity, config.initial_cash);
    assert!(portfolio.cagr.is_nan());
    assert!(portfolio.sharpe.is_nan());
    assert!(portfolio.win_rate.is_nan());
}

#[test]
fn equity_equals_cash_plus_marked_positions_every_day() {
    let n = 160;
    let universe = universe_of(vec![
        series_from_closes("AAA", &sine_wave(n, 36.0, 0.0)),
        series_from_closes("BBB", &sine_wave(n, 52.0, 1.0)),
    ]);
    let mut params = SmaParams::new();
    params.insert("AAA".to_string(), (5, 20));
    params.insert("BBB".to_string(), (5, 20));

    let config = BacktestConfig {
        fraction: 0.5,
        ..all_in_config()
    };
    let report = run_backtest(&universe, &params, &config).unwrap();

    // Reconstruct cash and positions from the event ledger, day by day.
    let mut cash = config.initial_cash;
    let mut positions: HashMap<String, f64> = HashMap::new();
    let mut event_iter = report.events.iter().peekable();

    for (i, &date) in report.equity_curve.dates.iter().enumerate() {
        while let Some(e) = event_iter.peek() {
            if e.date > date {
                break;
            }
            let held = positions.entry(e.ticker.clone()).or_insert(0.0);
            match e.side {
                Side::Buy => *held += e.shares,
                Side::Sell => *held -= e.shares,
            }
            cash = e.cash_after;
            event_iter.next();
        }

        let mut expected = cash;
        for (ticker, &shares) in &positions {
            if shares <= 0.0 {
                continue;
            }
            let series = &universe[ticker];
            let mark = series
                .open_on(date)
                .unwrap_or_else(|| series.last_open_at_or_before(date));
            if mark.is_nan() {
                continue;
            }
            expected += shares * mark;
        }

        let got = report.equity_curve.equity[i];
        assert!(
            (got - expected).abs() < 1e-6 * expected.abs().max(1.0),
            "equity mismatch on {}: {} vs {}",
            date,
            got,
            expected
        );
    }
}

#[test]
fn replaying_events_reconstructs_final_state() {
    let n = 160;
    let universe = universe_of(vec![series_from_closes("AAA", &sine_wave(n, 36.0, 0.0))]);
    let config = BacktestConfig {
        fees_per_order: 1.5,
        fraction: 0.5,
        ..all_in_config()
    };

    let report = run_backtest(&universe, &sma("AAA", 5, 20), &config).unwrap();
    assert!(!report.events.is_empty());

    // Cash identity: initial + sell proceeds − buy costs − per-event fees.
    let mut cash = config.initial_cash;
    for e in &report.events {
        match e.side {
            Side::Buy => cash -= e.price * e.shares,
            Side::Sell => cash += e.price * e.shares,
        }
        cash -= config.fees_per_order;
        assert!(
            (cash - e.cash_after).abs() < 1e-6,
            "cash drift at {} {}",
            e.date,
            e.ticker
        );
    }

    // Position identity: the FIFO book's open shares match the event fold.
    let (book, _) = LotBook::replay(&report.events);
    let mut folded = 0.0;
    for e in &report.events {
        match e.side {
            Side::Buy => folded += e.shares,
            Side::Sell => folded -= e.shares,
        }
    }
    assert!((book.open_shares("AAA") - folded).abs() < 1e-9);
}

#[test]
fn sl_tp_gate_uses_most_recent_buy_price() {
    // Open at 100, liquidate, re-open at 200: the stop must key off 200.
    let config = BacktestConfig {
        stop_loss_pct: 0.05,
        take_profit_pct: 0.0,
        sell_fraction_on_signal: 1.0,
        fees_per_order: 0.0,
        ..BacktestConfig::default()
    };
    let mut portfolio = Portfolio::new(10_000.0);

    let buy = |ticker: &str, shares: f64| OrderIntent {
        ticker: ticker.to_string(),
        side: Side::Buy,
        shares,
    };
    let sell = |ticker: &str, shares: f64| OrderIntent {
        ticker: ticker.to_string(),
        side: Side::Sell,
        shares,
    };
    let at = |p: f64| -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("AAA".to_string(), p);
        m
    };

    execute_orders(&mut portfolio, &[buy("AAA", 10.0)], &at(100.0), day(0), &config).unwrap();
    execute_orders(&mut portfolio, &[sell("AAA", 10.0)], &at(110.0), day(1), &config).unwrap();
    execute_orders(&mut portfolio, &[buy("AAA", 10.0)], &at(200.0), day(2), &config).unwrap();

    // 185 is up 85% on the first entry but down 7.5% on the latest one.
    let sells = select_stocks_to_sell(
        &portfolio.positions,
        &at(185.0),
        &Default::default(),
        &portfolio.last_buy_price,
        &config,
    );
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].shares, 10.0);

    // 195 is only 2.5% under the latest entry: no stop.
    let sells = select_stocks_to_sell(
        &portfolio.positions,
        &at(195.0),
        &Default::default(),
        &portfolio.last_buy_price,
        &config,
    );
    assert!(sells.is_empty());
}

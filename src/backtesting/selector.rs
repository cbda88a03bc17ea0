// Order selection: ranks buy candidates, applies sell rules (signal, SL, TP)

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::backtesting::executor::{OrderIntent, Side};
use crate::config::BacktestConfig;
use crate::market_data::Universe;
use crate::signals::indicators::priority_score;
use crate::signals::sizing::{position_size, round_down_to_lot};

/// Per-ticker (short, long) SMA windows.
pub type SmaParams = BTreeMap<String, (usize, usize)>;

/// Windows used when a ticker has no optimized pair.
pub const DEFAULT_SMA: (usize, usize) = (10, 50);

pub fn params_for(params: &SmaParams, ticker: &str) -> (usize, usize) {
    params.get(ticker).copied().unwrap_or(DEFAULT_SMA)
}

/// Pick the BUY orders for one day.
///
/// Candidates are tickers whose signal is +1, with a bar today and at least
/// `long_w` bars of history. They are ranked by priority score (descending,
/// ties broken by ticker id) and sized greedily against the cash remaining
/// after earlier picks, capped per ticker at `max_pct_per_ticker` of that
/// remaining cash — so later picks see a smaller base, and effective
/// per-ticker exposure drifts down as the day's cash is committed.
pub fn select_stocks_to_buy(
    date: NaiveDate,
    universe: &Universe,
    signals_today: &BTreeMap<String, i8>,
    cash: f64,
    params: &SmaParams,
    atr_map: &BTreeMap<String, Vec<f64>>,
    config: &BacktestConfig,
) -> Vec<OrderIntent> {
    let lot = config.lot();

    // Gather and score candidates. BTreeMap iteration keeps candidate order
    // (and therefore the stable sort's tie-break) keyed by ticker id.
    let mut candidates: Vec<(String, f64, f64, usize)> = Vec::new();
    for (ticker, &signal) in signals_today {
        if signal != 1 {
            continue;
        }
        let series = match universe.get(ticker) {
            Some(s) => s,
            None => continue,
        };
        let idx = match series.index_of(date) {
            Some(i) => i,
            None => continue,
        };
        let price = series.bars()[idx].open;

        let (short_w, long_w) = params_for(params, ticker);
        if idx + 1 < long_w {
            continue; // insufficient history for a meaningful score
        }
        let closes: Vec<f64> = series.bars()[..=idx].iter().map(|b| b.close).collect();
        let score = priority_score(&closes, short_w, long_w, false);
        candidates.push((ticker.clone(), price, score, idx));
    }

    if candidates.is_empty() {
        return Vec::new();
    }
    candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut orders = Vec::new();
    let mut remaining_cash = cash;
    let max_today = config.max_positions_per_day.unwrap_or(usize::MAX);

    for (ticker, price, _score, idx) in candidates {
        if orders.len() >= max_today {
            break;
        }

        let atr = atr_map
            .get(&ticker)
            .and_then(|series| series.get(idx))
            .copied()
            .filter(|a| a.is_finite());

        let mut shares = position_size(remaining_cash, price, config, atr);
        if shares <= 0.0 {
            continue;
        }

        // Cap dollar exposure relative to the cash still uncommitted today.
        let max_allowed_value = remaining_cash * config.max_pct_per_ticker;
        if shares * price > max_allowed_value {
            shares = round_down_to_lot(max_allowed_value / price, lot);
            if shares <= 0.0 {
                continue;
            }
        }

        if shares * price > remaining_cash {
            shares = round_down_to_lot(remaining_cash / price, lot);
            if shares <= 0.0 {
                continue;
            }
        }

        remaining_cash -= shares * price;
        orders.push(OrderIntent {
            ticker,
            side: Side::Buy,
            shares,
        });
    }

    orders
}

/// Pick the SELL orders for one day.
///
/// A SELL signal sells `sell_fraction_on_signal` of the position; a breach
/// of the stop-loss or take-profit threshold (measured against the most
/// recent BUY price) upgrades it to a full liquidation. Share counts are
/// floored to lots, with one-lot and sell-the-remainder minimums, and the
/// list is truncated to `max_sells_per_day`.
pub fn select_stocks_to_sell(
    positions: &BTreeMap<String, f64>,
    price_map: &HashMap<String, f64>,
    signals_today: &BTreeMap<String, i8>,
    last_buy_price: &HashMap<String, f64>,
    config: &BacktestConfig,
) -> Vec<OrderIntent> {
    let lot = config.lot();
    let mut sells = Vec::new();

    for (ticker, &held) in positions {
        if held <= 0.0 {
            continue;
        }
        let price = match price_map.get(ticker) {
            Some(&p) if p > 0.0 && p.is_finite() => p,
            _ => continue,
        };

        let mut sell_fraction: f64 = 0.0;
        if signals_today.get(ticker).copied().unwrap_or(0) == -1 {
            sell_fraction = config.sell_fraction_on_signal;
        }

        if config.stop_loss_pct > 0.0 || config.take_profit_pct > 0.0 {
            if let Some(&buy_price) = last_buy_price.get(ticker) {
                if buy_price > 0.0 {
                    let change = (price - buy_price) / buy_price;
                    if config.stop_loss_pct > 0.0 && change <= -config.stop_loss_pct.abs() {
                        sell_fraction = 1.0;
                    } else if config.take_profit_pct > 0.0
                        && change >= config.take_profit_pct.abs()
                    {
                        sell_fraction = 1.0;
                    }
                }
            }
        }

        if sell_fraction <= 0.0 {
            continue;
        }

        let mut shares = round_down_to_lot(held * sell_fraction, lot);
        if shares <= 0.0 && held >= lot {
            shares = lot; // too small a slice, but at least one lot is there
        }
        if shares <= 0.0 && held < lot {
            shares = held.trunc(); // odd remainder below a lot: flush it
        }

        if shares > 0.0 {
            sells.push(OrderIntent {
                ticker: ticker.clone(),
                side: Side::Sell,
                shares,
            });
        }
    }

    if let Some(cap) = config.max_sells_per_day {
        sells.truncate(cap);
    }
    sells
}

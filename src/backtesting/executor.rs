// Order execution: applies intents to the portfolio and emits trade events

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use log::debug;

use crate::config::BacktestConfig;
use crate::error::{EngineError, Result};
use crate::signals::sizing::round_down_to_lot;

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// A sized order produced by the selector, not yet executed.
#[derive(Debug, Clone)]
pub struct OrderIntent {
    pub ticker: String,
    pub side: Side,
    pub shares: f64,
}

/// One executed fill. Append-only; `cash_after` snapshots the portfolio cash
/// immediately after this event settled.
#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub date: NaiveDate,
    pub ticker: String,
    pub side: Side,
    pub price: f64,
    pub shares: f64,
    pub cash_after: f64,
}

/// Mutable portfolio state for a single backtest run.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub cash: f64,
    /// Shares held per ticker; entries are ≥ 0.
    pub positions: BTreeMap<String, f64>,
    /// Price of the most recent BUY fill per ticker. A single scalar by
    /// design: stop-loss/take-profit gates compare against the latest entry
    /// only, not a per-lot average.
    pub last_buy_price: HashMap<String, f64>,
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            positions: BTreeMap::new(),
            last_buy_price: HashMap::new(),
        }
    }

    pub fn held(&self, ticker: &str) -> f64 {
        self.positions.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn open_position_count(&self) -> usize {
        self.positions.values().filter(|&&v| v > 0.0).count()
    }
}

/// Execute `orders` in sequence at the day's open prices.
///
/// Skips (order dropped, loop continues): missing or non-positive price,
/// BUY on a ticker already held, shares that round away to zero after an
/// affordability rescale. A SELL is clamped to the held share count.
/// Cash below zero after any order is a structural invariant violation and
/// aborts the run.
pub fn execute_orders(
    portfolio: &mut Portfolio,
    orders: &[OrderIntent],
    price_map: &HashMap<String, f64>,
    date: NaiveDate,
    config: &BacktestConfig,
) -> Result<Vec<TradeEvent>> {
    let fee = config.fees_per_order;
    let lot = config.lot();
    let mut events = Vec::new();

    for order in orders {
        let price = match price_map.get(&order.ticker) {
            Some(&p) if p > 0.0 && p.is_finite() => p,
            _ => {
                debug!("{} {}: no valid price, skipped", order.side.as_str(), order.ticker);
                continue;
            }
        };

        match order.side {
            Side::Sell => {
                let held = portfolio.held(&order.ticker);
                let sell_shares = order.shares.min(held);
                portfolio.cash += sell_shares * price;
                portfolio.cash -= fee;
                portfolio
                    .positions
                    .insert(order.ticker.clone(), held - sell_shares);

                if portfolio.cash < 0.0 {
                    return Err(EngineError::NegativeCash {
                        ticker: order.ticker.clone(),
                        side: Side::Sell.as_str(),
                        date,
                    });
                }
                events.push(TradeEvent {
                    date,
                    ticker: order.ticker.clone(),
                    side: Side::Sell,
                    price,
                    shares: sell_shares,
                    cash_after: portfolio.cash,
                });
            }
            Side::Buy => {
                // One open position per ticker: never add to an existing one.
                if portfolio.held(&order.ticker) > 0.0 {
                    debug!("BUY {}: position already open, skipped", order.ticker);
                    continue;
                }

                let mut buy_shares = order.shares;
                let mut cost = buy_shares * price;
                if cost + fee > portfolio.cash {
                    let affordable = round_down_to_lot((portfolio.cash - fee) / price, lot);
                    if affordable <= 0.0 {
                        debug!("BUY {}: not affordable after rescale, skipped", order.ticker);
                        continue;
                    }
                    buy_shares = affordable;
                    cost = buy_shares * price;
                }

                portfolio.cash -= cost;
                portfolio.cash -= fee;
                let held = portfolio.held(&order.ticker);
                portfolio
                    .positions
                    .insert(order.ticker.clone(), held + buy_shares);
                portfolio.last_buy_price.insert(order.ticker.clone(), price);

                if portfolio.cash < 0.0 {
                    return Err(EngineError::NegativeCash {
                        ticker: order.ticker.clone(),
                        side: Side::Buy.as_str(),
                        date,
                    });
                }
                events.push(TradeEvent {
                    date,
                    ticker: order.ticker.clone(),
                    side: Side::Buy,
                    price,
                    shares: buy_shares,
                    cash_after: portfolio.cash,
                });
            }
        }
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn intent(ticker: &str, side: Side, shares: f64) -> OrderIntent {
        OrderIntent {
            ticker: ticker.to_string(),
            side,
            shares,
        }
    }

    fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn buy_settles_cost_and_fee() {
        let config = BacktestConfig {
            fees_per_order: 5.0,
            ..BacktestConfig::default()
        };
        let mut portfolio = Portfolio::new(1_000.0);

        let events = execute_orders(
            &mut portfolio,
            &[intent("AAA", Side::Buy, 10.0)],
            &prices(&[("AAA", 50.0)]),
            day(),
            &config,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(portfolio.cash, 1_000.0 - 500.0 - 5.0);
        assert_eq!(portfolio.held("AAA"), 10.0);
        assert_eq!(portfolio.last_buy_price["AAA"], 50.0);
        assert_eq!(events[0].cash_after, portfolio.cash);
    }

    #[test]
    fn buy_on_open_position_is_skipped() {
        let config = BacktestConfig::default();
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.positions.insert("AAA".to_string(), 5.0);

        let events = execute_orders(
            &mut portfolio,
            &[intent("AAA", Side::Buy, 10.0)],
            &prices(&[("AAA", 50.0)]),
            day(),
            &config,
        )
        .unwrap();

        assert!(events.is_empty());
        assert_eq!(portfolio.held("AAA"), 5.0);
        assert_eq!(portfolio.cash, 10_000.0);
    }

    #[test]
    fn unaffordable_buy_rescales_to_lot() {
        let config = BacktestConfig {
            lot_size: 10,
            ..BacktestConfig::default()
        };
        let mut portfolio = Portfolio::new(1_040.0);

        let events = execute_orders(
            &mut portfolio,
            &[intent("AAA", Side::Buy, 60.0)],
            &prices(&[("AAA", 20.0)]),
            day(),
            &config,
        )
        .unwrap();

        // 60 shares cost 1_200 > 1_040; 52 affordable → floored to 50 (lot 10)
        assert_eq!(events[0].shares, 50.0);
        assert_eq!(portfolio.cash, 40.0);
    }

    #[test]
    fn sell_clamps_to_held_shares() {
        let config = BacktestConfig::default();
        let mut portfolio = Portfolio::new(100.0);
        portfolio.positions.insert("AAA".to_string(), 3.0);

        let events = execute_orders(
            &mut portfolio,
            &[intent("AAA", Side::Sell, 10.0)],
            &prices(&[("AAA", 25.0)]),
            day(),
            &config,
        )
        .unwrap();

        assert_eq!(events[0].shares, 3.0);
        assert_eq!(portfolio.held("AAA"), 0.0);
        assert_eq!(portfolio.cash, 100.0 + 75.0);
    }

    #[test]
    fn missing_price_skips_the_order() {
        let config = BacktestConfig::default();
        let mut portfolio = Portfolio::new(1_000.0);

        let events = execute_orders(
            &mut portfolio,
            &[
                intent("AAA", Side::Buy, 5.0),
                intent("BBB", Side::Buy, 5.0),
            ],
            &prices(&[("BBB", 10.0)]),
            day(),
            &config,
        )
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].ticker, "BBB");
    }

    #[test]
    fn fee_larger_than_proceeds_is_fatal() {
        let config = BacktestConfig {
            fees_per_order: 500.0,
            ..BacktestConfig::default()
        };
        let mut portfolio = Portfolio::new(0.0);
        portfolio.positions.insert("AAA".to_string(), 1.0);

        let err = execute_orders(
            &mut portfolio,
            &[intent("AAA", Side::Sell, 1.0)],
            &prices(&[("AAA", 10.0)]),
            day(),
            &config,
        )
        .unwrap_err();

        assert!(matches!(err, EngineError::NegativeCash { .. }));
    }
}

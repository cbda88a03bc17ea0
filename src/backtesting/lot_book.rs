// FIFO lot accounting: pairs SELL events against prior BUY lots

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::NaiveDate;

use crate::backtesting::executor::{Side, TradeEvent};
use crate::market_data::Universe;

/// One BUY tranche still (partially) open.
#[derive(Debug, Clone)]
pub struct Lot {
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub shares_remaining: f64,
}

/// A SELL matched against one lot.
#[derive(Debug, Clone)]
pub struct ClosedTrade {
    pub ticker: String,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub shares: f64,
    pub realized_pnl: f64,
    pub holding_days: i64,
}

/// Per-ticker FIFO queues of open lots.
///
/// Can be fed incrementally (`apply` as events are emitted) or rebuilt from
/// an event log (`replay`); the two paths produce identical ledgers because
/// replay is exactly a fold of `apply`.
#[derive(Debug, Clone, Default)]
pub struct LotBook {
    lots: BTreeMap<String, VecDeque<Lot>>,
}

impl LotBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event, appending any closed trades to `closed`.
    ///
    /// BUY pushes a lot; SELL peels front lots until the sold quantity is
    /// consumed. Sells beyond the book's total are ignored — under the
    /// executor's invariants they cannot occur, but replaying a foreign
    /// event log must not panic.
    pub fn apply(&mut self, event: &TradeEvent, closed: &mut Vec<ClosedTrade>) {
        if event.shares <= 0.0 {
            return;
        }
        match event.side {
            Side::Buy => {
                self.lots
                    .entry(event.ticker.clone())
                    .or_default()
                    .push_back(Lot {
                        entry_date: event.date,
                        entry_price: event.price,
                        shares_remaining: event.shares,
                    });
            }
            Side::Sell => {
                let queue = match self.lots.get_mut(&event.ticker) {
                    Some(q) => q,
                    None => return,
                };
                let mut remaining = event.shares;
                while remaining > 0.0 {
                    let lot = match queue.front_mut() {
                        Some(l) => l,
                        None => break,
                    };
                    let take = remaining.min(lot.shares_remaining);
                    closed.push(ClosedTrade {
                        ticker: event.ticker.clone(),
                        entry_date: lot.entry_date,
                        exit_date: event.date,
                        entry_price: lot.entry_price,
                        exit_price: event.price,
                        shares: take,
                        realized_pnl: (event.price - lot.entry_price) * take,
                        holding_days: (event.date - lot.entry_date).num_days(),
                    });
                    lot.shares_remaining -= take;
                    remaining -= take;
                    if lot.shares_remaining <= 0.0 {
                        queue.pop_front();
                    }
                }
            }
        }
    }

    /// Rebuild a book from an event log, returning it with the closed-trade
    /// ledger. Events are processed in ascending date order; same-day events
    /// keep their emission sequence (stable sort).
    pub fn replay(events: &[TradeEvent]) -> (LotBook, Vec<ClosedTrade>) {
        let mut ordered: Vec<&TradeEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.date);

        let mut book = LotBook::new();
        let mut closed = Vec::new();
        for event in ordered {
            book.apply(event, &mut closed);
        }
        (book, closed)
    }

    /// Open lots for `ticker`, oldest first.
    pub fn open_lots(&self, ticker: &str) -> Vec<&Lot> {
        self.lots
            .get(ticker)
            .map(|q| q.iter().collect())
            .unwrap_or_default()
    }

    pub fn open_shares(&self, ticker: &str) -> f64 {
        self.lots
            .get(ticker)
            .map(|q| q.iter().map(|l| l.shares_remaining).sum())
            .unwrap_or(0.0)
    }

    /// Unrealized PnL and market value per ticker, marked at the latest open
    /// price at or before `mark_date`. Tickers whose mark is NaN (no price
    /// yet) contribute nothing.
    pub fn mark_to_market(
        &self,
        universe: &Universe,
        mark_date: NaiveDate,
    ) -> (HashMap<String, f64>, HashMap<String, f64>) {
        let mut unrealized = HashMap::new();
        let mut market_value = HashMap::new();

        for ticker in universe.keys() {
            unrealized.insert(ticker.clone(), 0.0);
            market_value.insert(ticker.clone(), 0.0);

            let queue = match self.lots.get(ticker) {
                Some(q) if !q.is_empty() => q,
                _ => continue,
            };
            let price = match universe.get(ticker) {
                Some(series) => series.last_open_at_or_before(mark_date),
                None => f64::NAN,
            };
            if price.is_nan() {
                continue;
            }

            let mv: f64 = queue.iter().map(|l| l.shares_remaining * price).sum();
            let upnl: f64 = queue
                .iter()
                .map(|l| (price - l.entry_price) * l.shares_remaining)
                .sum();
            market_value.insert(ticker.clone(), mv);
            unrealized.insert(ticker.clone(), upnl);
        }

        (unrealized, market_value)
    }
}

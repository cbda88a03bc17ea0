// Backtesting core: selection, execution, FIFO accounting, metrics, driver

pub mod engine;
pub mod executor;
pub mod lot_book;
pub mod metrics;
pub mod selector;

pub use engine::{run_backtest, BacktestReport};
pub use executor::{execute_orders, OrderIntent, Portfolio, Side, TradeEvent};
pub use lot_book::{ClosedTrade, Lot, LotBook};
pub use metrics::{
    compute_return_stats, realized_stats, EquityCurve, PerfRow, RealizedStats, ReturnStats,
    PORTFOLIO_ROW,
};
pub use selector::{select_stocks_to_buy, select_stocks_to_sell, SmaParams, DEFAULT_SMA};

// Error taxonomy for the backtesting engine and its persistence layer

use chrono::NaiveDate;
use thiserror::Error;

/// Errors surfaced by the engine, optimizer and persistence layer.
///
/// Per-order and per-ticker anomalies (missing price, zero sizing, an
/// already-open position on a BUY) are *skips*, not errors — the simulation
/// logs them and continues. Only structural invariant violations and
/// unrecoverable input failures appear here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing columns, unparsable dates, empty universe — fatal to the caller.
    #[error("input error: {0}")]
    Input(String),

    /// Cash went below zero after an executed order. The executor's
    /// accounting guarantees this cannot happen for well-formed orders, so
    /// hitting it means the invariant is broken and the run must stop.
    #[error("cash went negative after {side} {ticker} on {date}")]
    NegativeCash {
        ticker: String,
        side: &'static str,
        date: NaiveDate,
    },

    /// No (short, long) pair in the grid produced a valid score.
    #[error("no valid grid results for SMA optimization")]
    OptimizerNoGrid,

    #[error("persistence error: {0}")]
    Io(#[from] std::io::Error),

    #[error("persistence error: {0}")]
    Csv(#[from] csv::Error),

    #[error("persistence error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

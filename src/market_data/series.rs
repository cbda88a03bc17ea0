// Per-ticker daily bar storage with date-indexed lookups

use chrono::NaiveDate;
use log::warn;

use crate::error::{EngineError, Result};

/// One trading day. High/Low are optional; indicators that need them fall
/// back to close-to-close ranges when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
}

/// An immutable, strictly date-ordered bar sequence for a single ticker.
///
/// Construction sorts the input and drops duplicate dates (keeping the
/// first occurrence), so every lookup can binary-search the date column.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    ticker: String,
    bars: Vec<Bar>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, mut bars: Vec<Bar>) -> Result<Self> {
        let ticker = ticker.into();
        if ticker.is_empty() {
            return Err(EngineError::input("ticker name must not be empty"));
        }

        bars.sort_by_key(|b| b.date);
        let before = bars.len();
        bars.dedup_by_key(|b| b.date);
        if bars.len() < before {
            warn!(
                "{}: dropped {} duplicate-date bars",
                ticker,
                before - bars.len()
            );
        }

        Ok(Self { ticker, bars })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    /// Index of the bar for `date`, if the ticker traded that day.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Open price on `date`, if the ticker traded that day.
    pub fn open_on(&self, date: NaiveDate) -> Option<f64> {
        self.index_of(date).map(|i| self.bars[i].open)
    }

    /// Latest open price at or before `date`; NaN when no bar qualifies.
    /// This is the forward-hold mark price used for equity sampling and
    /// unrealized PnL.
    pub fn last_open_at_or_before(&self, date: NaiveDate) -> f64 {
        let end = match self.bars.binary_search_by_key(&date, |b| b.date) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        if end == 0 {
            f64::NAN
        } else {
            self.bars[end - 1].open
        }
    }

    /// Bars with date ≤ `date` (the training slice).
    pub fn through(&self, date: NaiveDate) -> PriceSeries {
        let end = match self.bars.binary_search_by_key(&date, |b| b.date) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        PriceSeries {
            ticker: self.ticker.clone(),
            bars: self.bars[..end].to_vec(),
        }
    }

    /// Bars with date strictly after `date` (the validation slice).
    pub fn after(&self, date: NaiveDate) -> PriceSeries {
        let start = match self.bars.binary_search_by_key(&date, |b| b.date) {
            Ok(i) => i + 1,
            Err(i) => i,
        };
        PriceSeries {
            ticker: self.ticker.clone(),
            bars: self.bars[start..].to_vec(),
        }
    }
}

// Generic CSV loader for Yahoo-style daily bars (Date,Open,High,Low,Close,...)
// One file per ticker; the file stem names the ticker

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use csv::ReaderBuilder;
use log::{info, warn};

use crate::error::{EngineError, Result};
use crate::market_data::series::{Bar, PriceSeries};

/// A universe keyed by ticker. BTreeMap so every iteration over tickers is
/// deterministic.
pub type Universe = BTreeMap<String, PriceSeries>;

/// Parse an ISO-like date cell, tolerating timestamp/timezone suffixes such
/// as "2025-01-03 00:00:00-05:00". Times are discarded: a trading day is a
/// naive calendar day.
fn parse_trading_day(raw: &str) -> Option<NaiveDate> {
    let token = raw.split_whitespace().next()?;
    let date_part = token.split('T').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn parse_price(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell == "null" || cell == "N/A" {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Load one ticker's bars from a Yahoo-style CSV.
///
/// Required columns: `Date`, `Open`, `Close`. Optional: `High`, `Low`.
/// Rows with unparsable required cells are skipped with a warning.
pub fn load_price_series(path: &Path, ticker: &str) -> Result<PriceSeries> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .flexible(true)      // Handles varying column counts
        .trim(csv::Trim::All)
        .has_headers(true)
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    let col = |name: &str| -> Option<usize> {
        headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    };

    let date_idx = col("Date")
        .ok_or_else(|| EngineError::input(format!("{}: missing `Date` column", path.display())))?;
    let open_idx = col("Open")
        .ok_or_else(|| EngineError::input(format!("{}: missing `Open` column", path.display())))?;
    let close_idx = col("Close")
        .ok_or_else(|| EngineError::input(format!("{}: missing `Close` column", path.display())))?;
    let high_idx = col("High");
    let low_idx = col("Low");

    let mut bars = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let raw_date = record.get(date_idx).unwrap_or("");

        let date = match parse_trading_day(raw_date) {
            Some(d) => d,
            None => {
                warn!("{}: skipping unparsable Date '{}'", ticker, raw_date);
                continue;
            }
        };

        let open = record.get(open_idx).and_then(parse_price);
        let close = record.get(close_idx).and_then(parse_price);
        let (open, close) = match (open, close) {
            (Some(o), Some(c)) => (o, c),
            _ => {
                warn!("{}: skipping bad Open/Close on {}", ticker, date);
                continue;
            }
        };

        let high = high_idx.and_then(|i| record.get(i)).and_then(parse_price);
        let low = low_idx.and_then(|i| record.get(i)).and_then(parse_price);

        bars.push(Bar {
            date,
            open,
            high,
            low,
            close,
        });
    }

    if bars.is_empty() {
        return Err(EngineError::input(format!(
            "{}: no valid rows parsed — check CSV format",
            path.display()
        )));
    }

    PriceSeries::new(ticker, bars)
}

/// Load every `*.csv` in `dir` into a universe. Unreadable files are logged
/// and skipped; an empty result is fatal.
pub fn load_universe(dir: &Path) -> Result<Universe> {
    let mut universe = Universe::new();

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    entries.sort();

    for path in entries {
        let ticker = match path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s.to_string(),
            None => continue,
        };
        match load_price_series(&path, &ticker) {
            Ok(series) => {
                universe.insert(ticker, series);
            }
            Err(e) => warn!("cannot load {}: {}", path.display(), e),
        }
    }

    if universe.is_empty() {
        return Err(EngineError::input(format!(
            "no valid CSV files found in {}",
            dir.display()
        )));
    }

    info!(
        "loaded tickers: {:?}",
        universe.keys().collect::<Vec<_>>()
    );
    Ok(universe)
}

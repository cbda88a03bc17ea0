// Test helper utilities and synthetic price fixtures

use chrono::NaiveDate;
use goldencross::market_data::{Bar, PriceSeries, Universe};

pub const EPSILON: f64 = 1e-6;

pub fn day(i: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(i as u64)
}

/// Build a series where each day's open equals its close, so fills and
/// marks line up with the generated shape exactly.
pub fn series_from_closes(ticker: &str, closes: &[f64]) -> PriceSeries {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            date: day(i),
            open: close,
            high: None,
            low: None,
            close,
        })
        .collect();
    PriceSeries::new(ticker, bars).unwrap()
}

pub fn universe_of(series: Vec<PriceSeries>) -> Universe {
    series
        .into_iter()
        .map(|s| (s.ticker().to_string(), s))
        .collect()
}

/// Rise, pull back, then trend: the pullback drags the short SMA under the
/// long SMA so the resumed trend produces exactly one upward crossover.
pub fn dip_then_trend(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            if i < 60 {
                100.0 + 0.5 * i as f64
            } else if i < 80 {
                129.5 - 1.5 * (i - 59) as f64
            } else {
                99.5 + (i - 79) as f64
            }
        })
        .collect()
}

/// Flat base, a two-day pop that fires a buy crossover, then a multiplicative
/// crash that trips any stop-loss.
pub fn pop_then_crash(n: usize) -> Vec<f64> {
    let mut closes = Vec::with_capacity(n);
    for i in 0..n {
        let v = match i {
            0..=19 => 100.0,
            20 => 101.0,
            21 => 102.0,
            _ => 102.0 * 0.97f64.powi(i as i32 - 21),
        };
        closes.push(v);
    }
    closes
}

/// Sinusoid around 100 with the given period and phase (radians).
pub fn sine_wave(n: usize, period: f64, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / period + phase).sin())
        .collect()
}

/// A drifting sinusoid with an incommensurate fast chop layered on top, so
/// crossover trades produce a realistic mix of winners and losers.
pub fn choppy_wave(n: usize, period: f64) -> Vec<f64> {
    let tau = 2.0 * std::f64::consts::PI;
    (0..n)
        .map(|i| {
            let t = i as f64;
            100.0 + 10.0 * (tau * t / period).sin() + 3.5 * (tau * t / 7.3).sin() - 0.02 * t
        })
        .collect()
}

// SMA crossover signal generation with one-day execution delay

pub mod indicators;
pub mod sizing;

/// Per-bar signal data for one ticker, index-aligned with its `PriceSeries`.
///
/// `signal[i]` is the *action for day i*: +1 buy, −1 sell, 0 none. It is the
/// crossover observed at the close of day i−1, so the signal usable on day i
/// depends only on closes up to and including i−1.
#[derive(Debug, Clone)]
pub struct SignalFrame {
    pub sma_short: Vec<f64>,
    pub sma_long: Vec<f64>,
    pub signal: Vec<i8>,
}

impl SignalFrame {
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }
}

/// Trailing mean over `window` values; NaN until the window fills.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = sum / window as f64;
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = sum / window as f64;
    }
    out
}

/// Generate SMA crossover signals for one close series.
///
/// A raw crossover at day i needs both SMAs defined at i−1 and i:
/// upward (short crosses above long) → +1, downward → −1. The exposed
/// signal is the raw signal shifted forward one day, so execution happens
/// at the next day's open.
pub fn generate_signals(closes: &[f64], short_w: usize, long_w: usize) -> SignalFrame {
    let n = closes.len();
    let sma_short = rolling_mean(closes, short_w);
    let sma_long = rolling_mean(closes, long_w);

    let mut raw = vec![0i8; n];
    for i in 1..n {
        let (ps, pl) = (sma_short[i - 1], sma_long[i - 1]);
        let (s, l) = (sma_short[i], sma_long[i]);
        if ps.is_nan() || pl.is_nan() || s.is_nan() || l.is_nan() {
            continue;
        }
        if ps <= pl && s > l {
            raw[i] = 1;
        } else if ps >= pl && s < l {
            raw[i] = -1;
        }
    }

    // One-day execution delay: the action for day i is the cross seen at i−1.
    let mut signal = vec![0i8; n];
    for i in 1..n {
        signal[i] = raw[i - 1];
    }

    SignalFrame {
        sma_short,
        sma_long,
        signal,
    }
}

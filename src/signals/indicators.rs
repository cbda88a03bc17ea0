// Indicator kit: ATR and the buy-priority score

use crate::market_data::PriceSeries;
use crate::signals::rolling_mean;

/// Average true range, index-aligned with the series.
///
/// True range per bar: max(H−L, |H−prev_close|, |L−prev_close|) when the bar
/// carries High/Low (first bar: H−L), otherwise |ΔClose| (NaN on the first
/// bar). Smoothed with an exponential moving average α = 1/period, clipped
/// to ≥ 1e-4 and forward-filled.
pub fn compute_atr(series: &PriceSeries, period: usize) -> Vec<f64> {
    let bars = series.bars();
    let n = bars.len();
    let mut tr = vec![f64::NAN; n];

    for i in 0..n {
        let bar = &bars[i];
        match (bar.high, bar.low) {
            (Some(h), Some(l)) => {
                if i == 0 {
                    tr[i] = h - l;
                } else {
                    let pc = bars[i - 1].close;
                    tr[i] = (h - l).max((h - pc).abs()).max((l - pc).abs());
                }
            }
            _ => {
                if i > 0 {
                    tr[i] = (bar.close - bars[i - 1].close).abs();
                }
            }
        }
    }

    let alpha = 1.0 / period.max(1) as f64;
    let mut atr = vec![f64::NAN; n];
    let mut state: Option<f64> = None;
    for i in 0..n {
        if tr[i].is_nan() {
            continue; // output stays NaN here; the smoothing state carries over
        }
        let next = match state {
            Some(prev) => alpha * tr[i] + (1.0 - alpha) * prev,
            None => tr[i],
        };
        state = Some(next);
        atr[i] = next;
    }

    // Clip away degenerate zero ranges, then forward-fill the gaps.
    let mut last = f64::NAN;
    for v in atr.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            *v = v.max(1e-4);
            last = *v;
        }
    }
    atr
}

/// Sample standard deviation (n−1 denominator); NaN when fewer than two values.
fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// Priority score for ranking BUY candidates when daily slots are scarce.
///
/// Blends SMA strength, 20-day momentum and inverse 20-day volatility:
/// score = 0.5·(sma_short/sma_long − 1) + 0.4·momentum + 0.1·(1/vol).
/// Returns 0.0 when the history is shorter than long_w + 1 bars.
/// `skip_last` drops the most recent close first, for callers that must not
/// see the current bar.
pub fn priority_score(closes: &[f64], short_w: usize, long_w: usize, skip_last: bool) -> f64 {
    if closes.len() <= long_w {
        return 0.0;
    }

    let hist = if skip_last {
        &closes[..closes.len() - 1]
    } else {
        closes
    };
    let n = hist.len();

    let sma_short = rolling_mean(hist, short_w);
    let sma_long = rolling_mean(hist, long_w);
    let (last_short, last_long) = match (
        sma_short.iter().rev().find(|v| !v.is_nan()),
        sma_long.iter().rev().find(|v| !v.is_nan()),
    ) {
        (Some(&s), Some(&l)) => (s, l),
        _ => return 0.0,
    };
    let sma_strength = last_short / last_long - 1.0;

    let momentum = if n >= 20 {
        hist[n - 1] / hist[n - 20] - 1.0
    } else {
        0.0
    };

    // Sample std of the last 20 daily pct-changes; 1.0 when degenerate so the
    // inverse-vol term stays bounded.
    let mut vol = f64::NAN;
    if n >= 21 {
        let changes: Vec<f64> = (n - 20..n).map(|i| hist[i] / hist[i - 1] - 1.0).collect();
        vol = sample_std(&changes);
    }
    if vol.is_nan() || vol == 0.0 {
        vol = 1.0;
    }

    sma_strength * 0.5 + momentum * 0.4 + (1.0 / vol) * 0.1
}

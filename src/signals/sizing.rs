// Position sizing: fraction / fixed / volatility-risk methods with lot rounding

use crate::config::{BacktestConfig, SizingMethod};

/// Floor `shares` to a whole multiple of `lot`.
pub fn round_down_to_lot(shares: f64, lot: f64) -> f64 {
    let lot = lot.max(1.0);
    (shares / lot).floor() * lot
}

/// Share count for a BUY against `cash` at `price`.
///
/// Returns 0 when price or cash is non-positive, and for the volatility
/// method when no usable ATR is supplied. Whole-lot multiples unless
/// `allow_fractional` is set.
pub fn position_size(cash: f64, price: f64, config: &BacktestConfig, atr: Option<f64>) -> f64 {
    if price <= 0.0 || cash <= 0.0 {
        return 0.0;
    }

    let value = match config.sizing_method {
        SizingMethod::Fraction => cash * config.fraction,
        SizingMethod::Fixed => config.fixed_amount,
        SizingMethod::Volatility => {
            let atr = match atr {
                Some(a) if a > 0.0 && a.is_finite() => a,
                _ => return 0.0,
            };
            let risk_per_share = atr * config.atr_multiplier;
            if risk_per_share <= 0.0 {
                return 0.0;
            }
            let shares = (cash * config.volatility_risk_pct) / risk_per_share;
            return if config.allow_fractional {
                shares
            } else {
                round_down_to_lot(shares, config.lot())
            };
        }
    };

    if config.allow_fractional {
        value / price
    } else {
        round_down_to_lot(value / price, config.lot())
    }
}

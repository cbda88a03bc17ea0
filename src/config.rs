// Backtest configuration - the single immutable knob set shared by the
// selector, sizer, executor and optimizer

use serde::{Deserialize, Serialize};

/// How the share count for a BUY is derived from available cash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMethod {
    /// Target value = cash × `fraction`.
    Fraction,
    /// Target value = `fixed_amount`, regardless of cash.
    Fixed,
    /// Risk-based: shares = (cash × `volatility_risk_pct`) / (ATR × `atr_multiplier`).
    Volatility,
}

/// What the optimizer does with a grid point whose backtest produced fewer
/// than `min_trades` closed trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradePenaltyMode {
    /// Multiply the score by n_trades / min_trades.
    Scale,
    /// Discard the candidate (score becomes NaN).
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    // capital / sizing
    pub initial_cash: f64,
    pub sizing_method: SizingMethod,
    /// Fraction of cash per BUY when `sizing_method` is `Fraction`.
    pub fraction: f64,
    /// Dollar value per BUY when `sizing_method` is `Fixed`.
    pub fixed_amount: f64,
    /// Shares are floored to multiples of this (≥ 1).
    pub lot_size: u32,
    pub allow_fractional: bool,
    pub volatility_risk_pct: f64,
    pub atr_multiplier: f64,

    // trade rules
    /// Loss fraction that forces a full liquidation; 0 disables the stop.
    pub stop_loss_pct: f64,
    /// Gain fraction that forces a full liquidation; 0 disables the target.
    pub take_profit_pct: f64,
    /// Fraction of the position sold on a SELL signal.
    pub sell_fraction_on_signal: f64,
    /// None = unlimited sells per day.
    pub max_sells_per_day: Option<usize>,
    /// None = unlimited new positions per day.
    pub max_positions_per_day: Option<usize>,
    /// None = unlimited concurrently open positions.
    pub max_positions_in_portfolio: Option<usize>,
    /// Cap on the capital committed to a single BUY, as a fraction of the
    /// cash still uncommitted that day.
    pub max_pct_per_ticker: f64,

    // execution / indicators
    /// Flat fee charged on every executed BUY and SELL.
    pub fees_per_order: f64,
    pub atr_period: usize,

    // optimizer regularization
    pub min_trades: usize,
    pub trade_penalty_mode: TradePenaltyMode,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            sizing_method: SizingMethod::Volatility,
            fraction: 0.25,
            fixed_amount: 10_000.0,
            lot_size: 1,                    // US market: minimum one share
            allow_fractional: false,
            volatility_risk_pct: 0.02,      // risk 2% of cash per order
            atr_multiplier: 1.0,
            stop_loss_pct: 0.08,
            take_profit_pct: 0.20,
            sell_fraction_on_signal: 1.0,
            max_sells_per_day: None,
            max_positions_per_day: None,
            max_positions_in_portfolio: None,
            max_pct_per_ticker: 0.5,
            fees_per_order: 0.0,
            atr_period: 14,
            min_trades: 20,
            trade_penalty_mode: TradePenaltyMode::Scale,
        }
    }
}

impl BacktestConfig {
    /// Lot size clamped to at least 1, as a share count.
    pub fn lot(&self) -> f64 {
        f64::from(self.lot_size.max(1))
    }
}

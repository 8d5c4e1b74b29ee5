// Technical indicators module
// Short/medium/long simple and exponential moving averages over candle closes

pub mod moving_average;

pub use moving_average::{calculate_ema, calculate_sma, ema_series, sma_series};

use serde::{Deserialize, Serialize};

use crate::error::TradingError;
use crate::models::Candle;

/// Short/medium/long lookback periods for one moving-average family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodSet {
    pub short: usize,
    pub medium: usize,
    pub long: usize,
}

impl Default for PeriodSet {
    fn default() -> Self {
        Self {
            short: 3,
            medium: 7,
            long: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IndicatorPeriods {
    pub sma: PeriodSet,
    pub ema: PeriodSet,
}

/// Derived values at one candle; `None` until the period has enough history
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct IndicatorSet {
    pub sma_short: Option<f64>,
    pub sma_medium: Option<f64>,
    pub sma_long: Option<f64>,
    pub ema_short: Option<f64>,
    pub ema_medium: Option<f64>,
    pub ema_long: Option<f64>,
}

impl IndicatorSet {
    /// True once every value the signal rule compares is defined
    pub fn has_signal_inputs(&self) -> bool {
        self.sma_short.is_some()
            && self.sma_medium.is_some()
            && self.ema_short.is_some()
            && self.ema_medium.is_some()
    }
}

/// Compute the indicator set for every candle of the series
pub fn calculate_indicators(
    candles: &[Candle],
    periods: &IndicatorPeriods,
) -> Result<Vec<IndicatorSet>, TradingError> {
    if candles.is_empty() {
        return Err(TradingError::InsufficientHistory {
            available: 0,
            required: 1,
        });
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let sma_short = sma_series(&closes, periods.sma.short);
    let sma_medium = sma_series(&closes, periods.sma.medium);
    let sma_long = sma_series(&closes, periods.sma.long);
    let ema_short = ema_series(&closes, periods.ema.short);
    let ema_medium = ema_series(&closes, periods.ema.medium);
    let ema_long = ema_series(&closes, periods.ema.long);

    Ok((0..closes.len())
        .map(|i| IndicatorSet {
            sma_short: sma_short[i],
            sma_medium: sma_medium[i],
            sma_long: sma_long[i],
            ema_short: ema_short[i],
            ema_medium: ema_medium[i],
            ema_long: ema_long[i],
        })
        .collect())
}

/// Indicator set at the most recent candle
pub fn latest_indicators(
    candles: &[Candle],
    periods: &IndicatorPeriods,
) -> Result<IndicatorSet, TradingError> {
    let series = calculate_indicators(candles, periods)?;
    series
        .last()
        .copied()
        .ok_or(TradingError::InsufficientHistory {
            available: 0,
            required: 1,
        })
}

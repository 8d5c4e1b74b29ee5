// Trading strategy module
pub mod moving_average;
pub mod signals;

pub use moving_average::MovingAverageStrategy;
pub use signals::{signal_from_indicators, validate_candle_sequence};

use crate::error::TradingError;
use crate::indicators::IndicatorSet;
use crate::models::{Candle, Signal};

/// Signal together with the indicator values it was derived from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub indicators: IndicatorSet,
    pub signal: Signal,
}

/// Base trait for all trading strategies
pub trait Strategy: Send + Sync {
    /// Evaluate the most recent candle of the series
    fn evaluate(&self, candles: &[Candle]) -> Result<Evaluation, TradingError>;

    /// Generate a trading signal based on market data
    fn generate_signal(&self, candles: &[Candle]) -> Result<Signal, TradingError> {
        Ok(self.evaluate(candles)?.signal)
    }

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required before a signal can be produced
    fn min_candles_required(&self) -> usize;
}

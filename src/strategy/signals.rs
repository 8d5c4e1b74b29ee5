use crate::error::TradingError;
use crate::indicators::IndicatorSet;
use crate::models::{Candle, Signal};

/// Map the latest indicator values to a signal
///
/// Buy when both short averages sit strictly above their medium averages,
/// Sell when both sit strictly below. Equality, mixed direction or an
/// undefined input is Hold. Long-period values are never consulted.
pub fn signal_from_indicators(indicators: &IndicatorSet) -> Signal {
    let (Some(sma_short), Some(sma_medium), Some(ema_short), Some(ema_medium)) = (
        indicators.sma_short,
        indicators.sma_medium,
        indicators.ema_short,
        indicators.ema_medium,
    ) else {
        return Signal::Hold;
    };

    if sma_short > sma_medium && ema_short > ema_medium {
        Signal::Buy
    } else if sma_short < sma_medium && ema_short < ema_medium {
        Signal::Sell
    } else {
        Signal::Hold
    }
}

/// Validate that candles are ordered by strictly increasing timestamp
pub fn validate_candle_sequence(candles: &[Candle]) -> Result<(), TradingError> {
    for window in candles.windows(2) {
        if window[1].timestamp <= window[0].timestamp {
            return Err(TradingError::InvalidInput(format!(
                "candles are not strictly increasing: {} followed by {}",
                window[0].timestamp.format("%Y-%m-%d %H:%M:%S"),
                window[1].timestamp.format("%Y-%m-%d %H:%M:%S")
            )));
        }
    }

    Ok(())
}

use super::{
    signals::{signal_from_indicators, validate_candle_sequence},
    Evaluation, Strategy,
};
use crate::error::TradingError;
use crate::indicators::{latest_indicators, IndicatorPeriods};
use crate::models::Candle;

/// Dual moving-average trend strategy
///
/// Buys when the short SMA and short EMA both lead their medium-period
/// counterparts and sells when both lag. Long-period averages are computed
/// and reported alongside but do not gate the signal.
#[derive(Debug, Clone, Default)]
pub struct MovingAverageStrategy {
    periods: IndicatorPeriods,
}

impl MovingAverageStrategy {
    pub fn new(periods: IndicatorPeriods) -> Self {
        Self { periods }
    }
}

impl Strategy for MovingAverageStrategy {
    fn evaluate(&self, candles: &[Candle]) -> Result<Evaluation, TradingError> {
        validate_candle_sequence(candles)?;

        let indicators = latest_indicators(candles, &self.periods)?;

        if !indicators.has_signal_inputs() {
            return Err(TradingError::InsufficientHistory {
                available: candles.len(),
                required: self.min_candles_required(),
            });
        }

        let signal = signal_from_indicators(&indicators);

        tracing::debug!(
            "Indicators: SMA {:.2}/{:.2}/{:?} EMA {:.2}/{:.2}/{:?} -> {}",
            indicators.sma_short.unwrap_or_default(),
            indicators.sma_medium.unwrap_or_default(),
            indicators.sma_long,
            indicators.ema_short.unwrap_or_default(),
            indicators.ema_medium.unwrap_or_default(),
            indicators.ema_long,
            signal
        );

        Ok(Evaluation { indicators, signal })
    }

    fn name(&self) -> &str {
        "MovingAverageStrategy"
    }

    fn min_candles_required(&self) -> usize {
        self.periods
            .sma
            .short
            .max(self.periods.sma.medium)
            .max(self.periods.ema.short)
            .max(self.periods.ema.medium)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::PeriodSet;
    use crate::models::Signal;
    use chrono::{Duration, TimeZone, Utc};

    fn create_test_candles(prices: Vec<f64>) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| Candle {
                timestamp: start + Duration::minutes(i as i64),
                open: price,
                high: price * 1.01,
                low: price * 0.99,
                close: price,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_strategy_requires_sufficient_data() {
        let strategy = MovingAverageStrategy::default();
        let candles = create_test_candles(vec![100.0, 101.0, 102.0]);

        let result = strategy.generate_signal(&candles);
        assert!(matches!(
            result,
            Err(TradingError::InsufficientHistory {
                available: 3,
                required: 7
            })
        ));
    }

    #[test]
    fn test_empty_series_is_insufficient_history() {
        let strategy = MovingAverageStrategy::default();
        assert!(matches!(
            strategy.generate_signal(&[]),
            Err(TradingError::InsufficientHistory { .. })
        ));
    }

    #[test]
    fn test_long_period_not_required_for_signal() {
        let strategy = MovingAverageStrategy::default();
        // 7 candles: short/medium defined, long (15) still undefined
        let candles = create_test_candles((0..7).map(|i| 100.0 + i as f64).collect());

        let evaluation = strategy.evaluate(&candles).unwrap();
        assert!(evaluation.indicators.sma_long.is_none());
        assert!(evaluation.indicators.ema_long.is_none());
        assert_eq!(evaluation.signal, Signal::Buy);
    }

    #[test]
    fn test_uptrend_buys() {
        let strategy = MovingAverageStrategy::default();
        let candles = create_test_candles((0..30).map(|i| 100.0 + i as f64).collect());

        assert_eq!(strategy.generate_signal(&candles).unwrap(), Signal::Buy);
    }

    #[test]
    fn test_downtrend_sells() {
        let strategy = MovingAverageStrategy::default();
        let candles = create_test_candles((0..30).map(|i| 200.0 - i as f64 * 2.0).collect());

        assert_eq!(strategy.generate_signal(&candles).unwrap(), Signal::Sell);
    }

    #[test]
    fn test_flat_market_holds() {
        let strategy = MovingAverageStrategy::default();
        let candles = create_test_candles(vec![100.0; 30]);

        assert_eq!(strategy.generate_signal(&candles).unwrap(), Signal::Hold);
    }

    #[test]
    fn test_unordered_candles_rejected() {
        let strategy = MovingAverageStrategy::default();
        let mut candles = create_test_candles((0..10).map(|i| 100.0 + i as f64).collect());
        candles.swap(3, 4);

        assert!(matches!(
            strategy.generate_signal(&candles),
            Err(TradingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_custom_periods() {
        let strategy = MovingAverageStrategy::new(IndicatorPeriods {
            sma: PeriodSet {
                short: 5,
                medium: 20,
                long: 50,
            },
            ema: PeriodSet {
                short: 8,
                medium: 21,
                long: 55,
            },
        });
        assert_eq!(strategy.min_candles_required(), 21);
        assert_eq!(strategy.name(), "MovingAverageStrategy");
    }
}

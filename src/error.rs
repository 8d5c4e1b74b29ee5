use thiserror::Error;

use crate::api::ExchangeError;

/// Failures that can end a single decision cycle
#[derive(Error, Debug)]
pub enum TradingError {
    #[error("insufficient history: {available} candles available, {required} required")]
    InsufficientHistory { available: usize, required: usize },

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl TradingError {
    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, TradingError::Exchange(e) if e.is_insufficient_funds())
    }
}

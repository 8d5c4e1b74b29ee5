use serde::{Deserialize, Serialize};

/// Position-tracking state carried between cycles, owned by the trade executor
///
/// Lives for the process lifetime only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingState {
    /// Price of the most recent successful buy fill
    pub last_buy_price: Option<f64>,
    /// Cumulative realized profit/loss in quote units
    pub realized_pnl: f64,
}

impl TradingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_buy(&mut self, fill_price: f64) {
        self.last_buy_price = Some(fill_price);
    }

    /// Book a sell fill against the last buy price
    ///
    /// Returns the realized delta, or `None` when no buy has happened yet and
    /// there is no reference price to measure against.
    pub(crate) fn record_sell(&mut self, fill_price: f64, base_amount: f64) -> Option<f64> {
        let reference = self.last_buy_price?;
        let delta = (fill_price - reference) * base_amount;
        self.realized_pnl += delta;
        Some(delta)
    }
}

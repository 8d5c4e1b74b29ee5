// Exchange collaborator: the contract the trading core consumes, plus clients
pub mod error;
pub mod okx;
pub mod paper;

pub use error::ExchangeError;
pub use okx::OkxClient;
pub use paper::PaperExchange;

use async_trait::async_trait;

use crate::models::{BalanceSnapshot, Candle, MarketSymbol, Order, OrderResult, OrderSide};

/// Everything the decision cycle needs from an exchange
///
/// Each call is a single request from the core's point of view; retry and
/// rate limiting stay inside the implementation.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Totals of the base and quote assets of `symbol`
    async fn fetch_balances(&self, symbol: &MarketSymbol) -> Result<BalanceSnapshot, ExchangeError>;

    /// Last traded price
    async fn fetch_current_price(&self, symbol: &MarketSymbol) -> Result<f64, ExchangeError>;

    /// Up to `limit` candles, oldest first. May return fewer when history is short.
    async fn fetch_candles(
        &self,
        symbol: &MarketSymbol,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Market buy of `base_amount` units of the base asset
    async fn place_market_buy(
        &self,
        symbol: &MarketSymbol,
        base_amount: f64,
        price: f64,
    ) -> Result<OrderResult, ExchangeError>;

    /// Market sell of `base_amount` units of the base asset
    async fn place_market_sell(
        &self,
        symbol: &MarketSymbol,
        base_amount: f64,
        price: f64,
    ) -> Result<OrderResult, ExchangeError>;

    /// Place `order` on the side it names
    async fn place_order(&self, symbol: &MarketSymbol, order: &Order) -> Result<OrderResult, ExchangeError> {
        match order.side {
            OrderSide::Buy => self.place_market_buy(symbol, order.base_amount, order.price).await,
            OrderSide::Sell => self.place_market_sell(symbol, order.base_amount, order.price).await,
        }
    }
}

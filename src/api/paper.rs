use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use super::{ExchangeClient, ExchangeError, OkxClient};
use crate::models::{BalanceSnapshot, Candle, MarketSymbol, OrderResult, OrderSide};

// Relative slack so a budget spent to the last unit is not rejected on rounding
const BALANCE_TOLERANCE: f64 = 1e-9;

struct PaperBook {
    balances: BalanceSnapshot,
    price: f64,
    candles: Vec<Candle>,
    orders: Vec<OrderResult>,
    pending_failures: VecDeque<ExchangeError>,
    next_order_id: u64,
}

/// In-memory exchange that fills market orders against local balances
///
/// Market data is either scripted (`set_price`, `set_candles`) or read from
/// OKX public endpoints when built with [`PaperExchange::with_market_data`].
pub struct PaperExchange {
    market: Option<OkxClient>,
    book: Mutex<PaperBook>,
}

impl PaperExchange {
    pub fn new(balances: BalanceSnapshot, price: f64) -> Self {
        Self {
            market: None,
            book: Mutex::new(PaperBook {
                balances,
                price,
                candles: Vec::new(),
                orders: Vec::new(),
                pending_failures: VecDeque::new(),
                next_order_id: 1,
            }),
        }
    }

    /// Paper balances with live prices and candles
    pub fn with_market_data(market: OkxClient, balances: BalanceSnapshot) -> Self {
        let mut exchange = Self::new(balances, 0.0);
        exchange.market = Some(market);
        exchange
    }

    pub async fn set_price(&self, price: f64) {
        self.book.lock().await.price = price;
    }

    pub async fn set_candles(&self, candles: Vec<Candle>) {
        self.book.lock().await.candles = candles;
    }

    /// Make the next order placement fail with `error`
    pub async fn fail_next_order(&self, error: ExchangeError) {
        self.book.lock().await.pending_failures.push_back(error);
    }

    pub async fn balances(&self) -> BalanceSnapshot {
        self.book.lock().await.balances
    }

    /// Every fill so far, oldest first
    pub async fn orders(&self) -> Vec<OrderResult> {
        self.book.lock().await.orders.clone()
    }

    async fn fill(
        &self,
        side: OrderSide,
        base_amount: f64,
        price: f64,
    ) -> Result<OrderResult, ExchangeError> {
        let mut book = self.book.lock().await;

        if let Some(error) = book.pending_failures.pop_front() {
            return Err(error);
        }

        if !(base_amount > 0.0) || !(price > 0.0) {
            return Err(ExchangeError::Api {
                code: "51000".to_string(),
                message: format!("invalid order size {} at price {}", base_amount, price),
            });
        }

        match side {
            OrderSide::Buy => {
                let cost = base_amount * price;
                let available = book.balances.quote_asset_total;
                if cost > available * (1.0 + BALANCE_TOLERANCE) + BALANCE_TOLERANCE {
                    return Err(ExchangeError::InsufficientFunds(format!(
                        "need {:.2} quote, have {:.2}",
                        cost, available
                    )));
                }
                book.balances.quote_asset_total = (available - cost).max(0.0);
                book.balances.base_asset_total += base_amount;
            }
            OrderSide::Sell => {
                let available = book.balances.base_asset_total;
                if base_amount > available * (1.0 + BALANCE_TOLERANCE) {
                    return Err(ExchangeError::InsufficientFunds(format!(
                        "need {:.8} base, have {:.8}",
                        base_amount, available
                    )));
                }
                book.balances.base_asset_total = (available - base_amount).max(0.0);
                book.balances.quote_asset_total += base_amount * price;
            }
        }

        let order_id = format!("paper-{}", book.next_order_id);
        book.next_order_id += 1;

        let result = OrderResult {
            order_id,
            side,
            base_amount,
            fill_price: price,
            timestamp: Utc::now(),
        };
        book.orders.push(result.clone());

        Ok(result)
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn fetch_balances(&self, _symbol: &MarketSymbol) -> Result<BalanceSnapshot, ExchangeError> {
        Ok(self.book.lock().await.balances)
    }

    async fn fetch_current_price(&self, symbol: &MarketSymbol) -> Result<f64, ExchangeError> {
        if let Some(market) = &self.market {
            let price = market.fetch_current_price(symbol).await?;
            self.book.lock().await.price = price;
            return Ok(price);
        }

        Ok(self.book.lock().await.price)
    }

    async fn fetch_candles(
        &self,
        symbol: &MarketSymbol,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        if let Some(market) = &self.market {
            return market.fetch_candles(symbol, timeframe, limit).await;
        }

        let book = self.book.lock().await;
        let skip = book.candles.len().saturating_sub(limit);
        Ok(book.candles[skip..].to_vec())
    }

    async fn place_market_buy(
        &self,
        _symbol: &MarketSymbol,
        base_amount: f64,
        price: f64,
    ) -> Result<OrderResult, ExchangeError> {
        self.fill(OrderSide::Buy, base_amount, price).await
    }

    async fn place_market_sell(
        &self,
        _symbol: &MarketSymbol,
        base_amount: f64,
        price: f64,
    ) -> Result<OrderResult, ExchangeError> {
        self.fill(OrderSide::Sell, base_amount, price).await
    }
}

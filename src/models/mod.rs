use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spot market identified as `BASE/QUOTE` (e.g. `BTC/USDT`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MarketSymbol {
    pub base: String,
    pub quote: String,
}

impl MarketSymbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Instrument id in the exchange's dash notation (`BTC-USDT`)
    pub fn inst_id(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }
}

impl fmt::Display for MarketSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for MarketSymbol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .or_else(|| s.split_once('-'))
            .ok_or_else(|| format!("symbol '{}' is not in BASE/QUOTE form", s))?;

        let (base, quote) = (base.trim(), quote.trim());
        if base.is_empty() || quote.is_empty() {
            return Err(format!("symbol '{}' has an empty asset", s));
        }

        Ok(Self::new(base, quote))
    }
}

/// OHLCV candlestick, most-recent-last within a series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::Hold => "hold",
        };
        f.write_str(label)
    }
}

/// Account totals for the traded pair, read fresh every cycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct BalanceSnapshot {
    pub quote_asset_total: f64,
    pub base_asset_total: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Market order as issued; never mutated after placement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub side: OrderSide,
    pub base_amount: f64,
    pub price: f64,
}

/// Fill confirmation returned by the exchange
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderResult {
    pub order_id: String,
    pub side: OrderSide,
    pub base_amount: f64,
    pub fill_price: f64,
    pub timestamp: DateTime<Utc>,
}

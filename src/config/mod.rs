// Configuration: defaults -> optional TOML file -> SPOTBOT__* environment
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::indicators::{IndicatorPeriods, PeriodSet};
use crate::models::MarketSymbol;

pub const DEFAULT_CONFIG_FILE: &str = "spotbot.toml";
pub const ENV_PREFIX: &str = "SPOTBOT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub exchange: ExchangeSettings,
    pub market: MarketSettings,
    pub indicators: IndicatorPeriods,
    pub trading: TradingSettings,
    pub reserves: ReserveSettings,
    pub runtime: RuntimeSettings,
}

/// Exchange connection. Keys are normally supplied through the environment.
#[derive(Clone, Deserialize)]
pub struct ExchangeSettings {
    pub api_key: String,
    pub secret_key: String,
    pub passphrase: String,
    pub base_url: String,
    /// Route orders to the exchange's demo-trading environment
    pub simulated: bool,
    pub requests_per_second: u32,
}

impl ExchangeSettings {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty() && !self.passphrase.is_empty()
    }
}

// Keep secrets out of logs
impl std::fmt::Debug for ExchangeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeSettings")
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("base_url", &self.base_url)
            .field("simulated", &self.simulated)
            .field("requests_per_second", &self.requests_per_second)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketSettings {
    /// Pair in `BASE/QUOTE` form
    pub symbol: String,
    pub timeframe: String,
    pub candle_limit: usize,
}

impl MarketSettings {
    pub fn market_symbol(&self) -> Result<MarketSymbol, ConfigError> {
        self.symbol.parse().map_err(ConfigError::Validation)
    }
}

/// Sizing and accounting parameters, all in quote units unless noted
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSettings {
    pub initial_quote_capital: f64,
    /// Upper bound on quote spent by one buy cycle
    pub max_trade_quote: f64,
    /// Base units sold per sell cycle
    pub minimum_sell_unit: f64,
    pub batch_size_quote: f64,
    /// Quote balance must exceed this before buying
    pub minimum_trade_quote: f64,
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            initial_quote_capital: 72253.0,
            max_trade_quote: 1000.0,
            minimum_sell_unit: 0.001,
            batch_size_quote: 200.0,
            minimum_trade_quote: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReserveSettings {
    pub quote_floor: f64,
    pub base_floor: f64,
}

impl Default for ReserveSettings {
    fn default() -> Self {
        Self {
            quote_floor: 100.0,
            base_floor: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RuntimeSettings {
    pub poll_interval_secs: u64,
}

impl Settings {
    /// Load settings, reading `path` if given, else `spotbot.toml` when present
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Self::with_defaults(::config::Config::builder())?;

        builder = match path {
            Some(path) => builder.add_source(::config::File::from(path).required(true)),
            None => builder.add_source(::config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings: Settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string layered over the defaults
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Self::with_defaults(::config::Config::builder())?
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn with_defaults(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<::config::ConfigBuilder<::config::builder::DefaultState>, ConfigError> {
        let periods = PeriodSet::default();
        let trading = TradingSettings::default();
        let reserves = ReserveSettings::default();

        Ok(builder
            .set_default("exchange.api_key", "")?
            .set_default("exchange.secret_key", "")?
            .set_default("exchange.passphrase", "")?
            .set_default("exchange.base_url", "https://www.okx.com")?
            .set_default("exchange.simulated", true)?
            .set_default("exchange.requests_per_second", 10)?
            .set_default("market.symbol", "BTC/USDT")?
            .set_default("market.timeframe", "1m")?
            .set_default("market.candle_limit", 100)?
            .set_default("indicators.sma.short", periods.short as u64)?
            .set_default("indicators.sma.medium", periods.medium as u64)?
            .set_default("indicators.sma.long", periods.long as u64)?
            .set_default("indicators.ema.short", periods.short as u64)?
            .set_default("indicators.ema.medium", periods.medium as u64)?
            .set_default("indicators.ema.long", periods.long as u64)?
            .set_default("trading.initial_quote_capital", trading.initial_quote_capital)?
            .set_default("trading.max_trade_quote", trading.max_trade_quote)?
            .set_default("trading.minimum_sell_unit", trading.minimum_sell_unit)?
            .set_default("trading.batch_size_quote", trading.batch_size_quote)?
            .set_default("trading.minimum_trade_quote", trading.minimum_trade_quote)?
            .set_default("reserves.quote_floor", reserves.quote_floor)?
            .set_default("reserves.base_floor", reserves.base_floor)?
            .set_default("runtime.poll_interval_secs", 60)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.market.market_symbol()?;

        for (name, set) in [("sma", &self.indicators.sma), ("ema", &self.indicators.ema)] {
            if set.short == 0 || set.medium == 0 || set.long == 0 {
                return Err(ConfigError::Validation(format!(
                    "indicators.{} periods must be at least 1",
                    name
                )));
            }
        }

        let positive = [
            ("trading.max_trade_quote", self.trading.max_trade_quote),
            ("trading.minimum_sell_unit", self.trading.minimum_sell_unit),
            ("trading.batch_size_quote", self.trading.batch_size_quote),
        ];
        for (name, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(ConfigError::Validation(format!("{} must be > 0", name)));
            }
        }

        let non_negative = [
            ("trading.initial_quote_capital", self.trading.initial_quote_capital),
            ("trading.minimum_trade_quote", self.trading.minimum_trade_quote),
            ("reserves.quote_floor", self.reserves.quote_floor),
            ("reserves.base_floor", self.reserves.base_floor),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(ConfigError::Validation(format!("{} must be >= 0", name)));
            }
        }

        if self.market.candle_limit == 0 {
            return Err(ConfigError::Validation("market.candle_limit must be at least 1".into()));
        }
        if self.runtime.poll_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "runtime.poll_interval_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

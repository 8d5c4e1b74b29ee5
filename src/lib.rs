// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod indicators;
pub mod models;
pub mod pnl;
pub mod risk;
pub mod strategy;

// Re-export commonly used types
pub use api::{ExchangeClient, ExchangeError, OkxClient, PaperExchange};
pub use config::Settings;
pub use engine::{CycleReport, TradingEngine};
pub use error::TradingError;
pub use models::*;
pub use strategy::Strategy;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

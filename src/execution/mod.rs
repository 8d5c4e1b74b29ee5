// Order execution module
pub mod executor;
pub mod state;

pub use executor::{plan_batches, ExecutionAction, ExecutionDecision, ExecutionReport, TradeExecutor};
pub use state::TradingState;

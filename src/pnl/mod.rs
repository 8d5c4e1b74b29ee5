// Profit and loss reporting
use serde::Serialize;
use std::time::Duration;

use crate::execution::TradingState;
use crate::models::BalanceSnapshot;

/// Portfolio valuation at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProfitReport {
    /// Quote balance plus base balance marked at the current price
    pub unrealized_total: f64,
    /// `unrealized_total - initial_quote_capital + realized_pnl`
    pub total_profit: f64,
    pub realized_pnl: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PnlTracker {
    initial_quote_capital: f64,
}

impl PnlTracker {
    pub fn new(initial_quote_capital: f64) -> Self {
        Self {
            initial_quote_capital,
        }
    }

    pub fn report(
        &self,
        balances: &BalanceSnapshot,
        current_price: f64,
        state: &TradingState,
    ) -> ProfitReport {
        let unrealized_total =
            balances.quote_asset_total + balances.base_asset_total * current_price;

        let total_profit = unrealized_total - self.initial_quote_capital + state.realized_pnl;

        ProfitReport {
            unrealized_total,
            total_profit,
            realized_pnl: state.realized_pnl,
        }
    }
}

/// Final accounting for a run, logged on shutdown
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub runtime: Duration,
    pub cycles: u64,
    pub failed_cycles: u64,
    pub last_total_profit: Option<f64>,
    pub realized_pnl: f64,
}

impl RunSummary {
    pub fn runtime_minutes(&self) -> f64 {
        self.runtime.as_secs_f64() / 60.0
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "runtime {:.2} min, {} cycles ({} failed), realized P&L {:.2}",
            self.runtime_minutes(),
            self.cycles,
            self.failed_cycles,
            self.realized_pnl
        )?;
        if let Some(profit) = self.last_total_profit {
            write!(f, ", total profit {:.2}", profit)?;
        }
        Ok(())
    }
}

use crate::api::{ExchangeClient, ExchangeError};
use crate::config::ReserveSettings;
use crate::models::{BalanceSnapshot, MarketSymbol, Order, OrderResult, OrderSide};

/// What the balance floors call for, before anything is placed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReserveAssessment {
    /// Quote total is below its floor. Reported only; nothing is bought or moved.
    pub quote_below_floor: bool,
    /// Base units to buy to bring the base total back to its floor
    pub base_top_up: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReserveReport {
    pub assessment: ReserveAssessment,
    pub top_up: Option<OrderResult>,
}

impl ReserveReport {
    pub fn placed_order(&self) -> bool {
        self.top_up.is_some()
    }
}

/// Checks balance floors once per cycle, ahead of the signal-driven action
///
/// A base total under its floor is bought back up to exactly the floor. A
/// quote total under its floor only raises a warning.
#[derive(Debug, Clone, Copy)]
pub struct ReserveMonitor {
    floors: ReserveSettings,
}

impl ReserveMonitor {
    pub fn new(floors: ReserveSettings) -> Self {
        Self { floors }
    }

    pub fn assess(&self, balances: &BalanceSnapshot) -> ReserveAssessment {
        let quote_below_floor = balances.quote_asset_total < self.floors.quote_floor;
        let base_top_up = if balances.base_asset_total < self.floors.base_floor {
            Some(self.floors.base_floor - balances.base_asset_total)
        } else {
            None
        };

        ReserveAssessment {
            quote_below_floor,
            base_top_up,
        }
    }

    /// Assess the floors and place the base top-up order if one is due
    pub async fn enforce<E: ExchangeClient + ?Sized>(
        &self,
        exchange: &E,
        symbol: &MarketSymbol,
        balances: &BalanceSnapshot,
        current_price: f64,
    ) -> Result<ReserveReport, ExchangeError> {
        let assessment = self.assess(balances);

        if assessment.quote_below_floor {
            tracing::warn!(
                "⚠️  {} balance {:.2} below reserve floor {:.2}, no automatic top-up",
                symbol.quote,
                balances.quote_asset_total,
                self.floors.quote_floor
            );
        }

        let top_up = match assessment.base_top_up {
            Some(amount) => {
                tracing::warn!(
                    "⚠️  {} balance {:.6} below reserve floor {:.6}, buying {:.6}",
                    symbol.base,
                    balances.base_asset_total,
                    self.floors.base_floor,
                    amount
                );

                let order = Order {
                    side: OrderSide::Buy,
                    base_amount: amount,
                    price: current_price,
                };
                let fill = exchange.place_order(symbol, &order).await?;

                tracing::info!(
                    "🟢 Reserve top-up: bought {:.6} {} @ {:.2} {}",
                    fill.base_amount,
                    symbol.base,
                    fill.fill_price,
                    symbol.quote
                );
                Some(fill)
            }
            None => None,
        };

        Ok(ReserveReport { assessment, top_up })
    }
}

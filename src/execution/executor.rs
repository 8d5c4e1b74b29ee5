use crate::api::ExchangeClient;
use crate::config::TradingSettings;
use crate::error::TradingError;
use crate::execution::TradingState;
use crate::models::{BalanceSnapshot, MarketSymbol, Order, OrderResult, OrderSide, Signal};

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    /// Market buys, one per batch, amounts in quote units
    Buy { batches: Vec<f64> },
    /// One market sell of `base_amount`
    Sell { base_amount: f64 },
    Skip,
}

#[derive(Debug, Clone)]
pub struct ExecutionDecision {
    pub action: ExecutionAction,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    pub fills: Vec<OrderResult>,
    /// Change to realized P&L booked by this execution
    pub realized_pnl_delta: f64,
}

// Remainders at or below this share of a batch are rounding residue
const BATCH_RESIDUE: f64 = 1e-9;

/// Split `total` into `ceil(total / batch_size)` chunks: full batches and one
/// final remainder, summing to `total`
pub fn plan_batches(total: f64, batch_size: f64) -> Vec<f64> {
    if !(total > 0.0) || !(batch_size > 0.0) {
        return Vec::new();
    }

    let mut count = (total / batch_size).ceil().max(1.0) as usize;
    let mut last = total - (count - 1) as f64 * batch_size;

    // A total that is a whole multiple of an inexact size (0.4 / 0.1) can
    // divide to just over the integer; fold the residue into the last batch.
    if count > 1 && last <= batch_size * BATCH_RESIDUE {
        count -= 1;
        last = total - (count - 1) as f64 * batch_size;
    }

    let mut batches = vec![batch_size; count - 1];
    batches.push(last);
    batches
}

/// Turns signals into sized market orders and owns the trading state
pub struct TradeExecutor {
    settings: TradingSettings,
    state: TradingState,
}

impl TradeExecutor {
    pub fn new(settings: TradingSettings) -> Self {
        Self {
            settings,
            state: TradingState::new(),
        }
    }

    pub fn state(&self) -> &TradingState {
        &self.state
    }

    /// Decide what to do for a signal given fresh balances
    pub fn decide(&self, signal: Signal, balances: &BalanceSnapshot) -> ExecutionDecision {
        match signal {
            Signal::Buy => {
                let quote = balances.quote_asset_total;
                if quote <= self.settings.minimum_trade_quote {
                    return ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: format!(
                            "Insufficient funds: quote balance {:.2} not above minimum trade {:.2}",
                            quote, self.settings.minimum_trade_quote
                        ),
                    };
                }

                let total_to_spend = quote.min(self.settings.max_trade_quote);
                let batches = plan_batches(total_to_spend, self.settings.batch_size_quote);

                ExecutionDecision {
                    reason: format!(
                        "Buy signal: spending {:.2} in {} batch(es)",
                        total_to_spend,
                        batches.len()
                    ),
                    action: ExecutionAction::Buy { batches },
                }
            }

            Signal::Sell => {
                let unit = self.settings.minimum_sell_unit;
                let base = balances.base_asset_total;

                // The balance must clear the unit strictly; the order itself is
                // the unit (or the whole balance when smaller, which the gate
                // already excludes).
                if base > unit {
                    ExecutionDecision {
                        action: ExecutionAction::Sell {
                            base_amount: unit.min(base),
                        },
                        reason: format!("Sell signal: base balance {:.6} above unit {:.6}", base, unit),
                    }
                } else {
                    ExecutionDecision {
                        action: ExecutionAction::Skip,
                        reason: format!(
                            "Insufficient base: balance {:.6} not above sell unit {:.6}",
                            base, unit
                        ),
                    }
                }
            }

            Signal::Hold => ExecutionDecision {
                action: ExecutionAction::Skip,
                reason: "Hold signal".to_string(),
            },
        }
    }

    /// Place the orders of a decision, updating state after each fill
    ///
    /// Every batch uses the same `current_price`. A failed order stops the
    /// remaining batches; fills before it stay booked.
    pub async fn execute<E: ExchangeClient + ?Sized>(
        &mut self,
        decision: &ExecutionDecision,
        exchange: &E,
        symbol: &MarketSymbol,
        current_price: f64,
    ) -> Result<ExecutionReport, TradingError> {
        let mut report = ExecutionReport::default();

        match &decision.action {
            ExecutionAction::Buy { batches } => {
                if !(current_price > 0.0) {
                    return Err(TradingError::InvalidInput(format!(
                        "cannot size a buy at price {}",
                        current_price
                    )));
                }

                for (i, &batch_quote) in batches.iter().enumerate() {
                    let order = Order {
                        side: OrderSide::Buy,
                        base_amount: batch_quote / current_price,
                        price: current_price,
                    };
                    let fill = exchange
                        .place_order(symbol, &order)
                        .await
                        .inspect_err(|e| {
                            tracing::warn!(
                                "  ✗ Batch {}/{} failed after {} fill(s): {}",
                                i + 1,
                                batches.len(),
                                report.fills.len(),
                                e
                            )
                        })?;

                    self.state.record_buy(current_price);
                    tracing::info!(
                        "🟢 Batch buy {}/{}: {:.2} {} -> {:.6} {} @ {:.2}",
                        i + 1,
                        batches.len(),
                        batch_quote,
                        symbol.quote,
                        fill.base_amount,
                        symbol.base,
                        current_price
                    );
                    report.fills.push(fill);
                }
            }

            ExecutionAction::Sell { base_amount } => {
                let order = Order {
                    side: OrderSide::Sell,
                    base_amount: *base_amount,
                    price: current_price,
                };
                let fill = exchange.place_order(symbol, &order).await?;

                match self.state.record_sell(fill.fill_price, fill.base_amount) {
                    Some(delta) => {
                        report.realized_pnl_delta = delta;
                        tracing::info!(
                            "🔴 Sold {:.6} {} @ {:.2} {} (realized {:+.2})",
                            fill.base_amount,
                            symbol.base,
                            fill.fill_price,
                            symbol.quote,
                            delta
                        );
                    }
                    None => {
                        tracing::warn!(
                            "🔴 Sold {:.6} {} @ {:.2} with no prior buy this run, realized P&L unchanged",
                            fill.base_amount,
                            symbol.base,
                            fill.fill_price
                        );
                    }
                }
                report.fills.push(fill);
            }

            ExecutionAction::Skip => {}
        }

        Ok(report)
    }

    /// Decide and execute in one step
    pub async fn process_signal<E: ExchangeClient + ?Sized>(
        &mut self,
        signal: Signal,
        balances: &BalanceSnapshot,
        exchange: &E,
        symbol: &MarketSymbol,
        current_price: f64,
    ) -> Result<(ExecutionDecision, ExecutionReport), TradingError> {
        let decision = self.decide(signal, balances);
        tracing::info!("  Decision: {:?} - {}", decision.action, decision.reason);

        let report = self.execute(&decision, exchange, symbol, current_price).await?;
        Ok((decision, report))
    }
}

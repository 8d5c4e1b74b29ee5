// Decision loop: one cycle per timer tick, errors contained at the cycle boundary
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::api::ExchangeClient;
use crate::config::{ConfigError, Settings};
use crate::error::TradingError;
use crate::execution::{ExecutionDecision, ExecutionReport, TradeExecutor, TradingState};
use crate::models::{BalanceSnapshot, MarketSymbol};
use crate::pnl::{PnlTracker, ProfitReport, RunSummary};
use crate::risk::{ReserveMonitor, ReserveReport};
use crate::strategy::{Evaluation, MovingAverageStrategy, Strategy};

/// Everything one completed cycle observed and did
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// `None` when history was too short to produce a signal
    pub evaluation: Option<Evaluation>,
    pub current_price: f64,
    /// Balances the signal-driven decision was sized against
    pub balances: BalanceSnapshot,
    pub reserves: ReserveReport,
    pub decision: Option<ExecutionDecision>,
    pub execution: ExecutionReport,
    pub profit: ProfitReport,
}

pub struct TradingEngine<E: ExchangeClient> {
    exchange: E,
    symbol: MarketSymbol,
    timeframe: String,
    candle_limit: usize,
    poll_interval: Duration,
    strategy: MovingAverageStrategy,
    reserves: ReserveMonitor,
    executor: TradeExecutor,
    pnl: PnlTracker,
    started_at: Instant,
    cycles: u64,
    failed_cycles: u64,
    last_profit: Option<ProfitReport>,
}

impl<E: ExchangeClient> TradingEngine<E> {
    pub fn from_settings(exchange: E, settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            exchange,
            symbol: settings.market.market_symbol()?,
            timeframe: settings.market.timeframe.clone(),
            candle_limit: settings.market.candle_limit,
            poll_interval: Duration::from_secs(settings.runtime.poll_interval_secs),
            strategy: MovingAverageStrategy::new(settings.indicators),
            reserves: ReserveMonitor::new(settings.reserves),
            executor: TradeExecutor::new(settings.trading.clone()),
            pnl: PnlTracker::new(settings.trading.initial_quote_capital),
            started_at: Instant::now(),
            cycles: 0,
            failed_cycles: 0,
            last_profit: None,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn symbol(&self) -> &MarketSymbol {
        &self.symbol
    }

    pub fn state(&self) -> &TradingState {
        self.executor.state()
    }

    pub fn last_profit(&self) -> Option<&ProfitReport> {
        self.last_profit.as_ref()
    }

    /// Run one full decision cycle
    ///
    /// Short history only suppresses the signal; reserves and the profit
    /// report still run. Any other failure ends the cycle with an error.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, TradingError> {
        let candles = self
            .exchange
            .fetch_candles(&self.symbol, &self.timeframe, self.candle_limit)
            .await?;

        if let Some(latest) = candles.last() {
            tracing::info!(
                "📊 {} last close {:.2} ({} candles)",
                self.symbol,
                latest.close,
                candles.len()
            );
        }

        let evaluation = match self.strategy.evaluate(&candles) {
            Ok(evaluation) => {
                tracing::info!("📈 Signal: {}", evaluation.signal);
                Some(evaluation)
            }
            Err(TradingError::InsufficientHistory {
                available,
                required,
            }) => {
                tracing::info!(
                    "  Waiting for history: {}/{} candles, no signal this cycle",
                    available,
                    required
                );
                None
            }
            Err(e) => return Err(e),
        };

        let mut balances = self.exchange.fetch_balances(&self.symbol).await?;
        let current_price = self.exchange.fetch_current_price(&self.symbol).await?;
        self.log_balances(&balances, current_price);

        let reserves = self
            .reserves
            .enforce(&self.exchange, &self.symbol, &balances, current_price)
            .await?;
        if reserves.placed_order() {
            balances = self.exchange.fetch_balances(&self.symbol).await?;
        }

        let (decision, execution) = match evaluation {
            Some(evaluation) => {
                let (decision, report) = self
                    .executor
                    .process_signal(
                        evaluation.signal,
                        &balances,
                        &self.exchange,
                        &self.symbol,
                        current_price,
                    )
                    .await?;
                (Some(decision), report)
            }
            None => (None, ExecutionReport::default()),
        };

        let closing_balances = if execution.fills.is_empty() {
            balances
        } else {
            self.exchange.fetch_balances(&self.symbol).await?
        };
        let profit = self
            .pnl
            .report(&closing_balances, current_price, self.executor.state());
        tracing::info!(
            "💰 Total profit: {:.2} {} (portfolio {:.2}, realized {:.2})",
            profit.total_profit,
            self.symbol.quote,
            profit.unrealized_total,
            profit.realized_pnl
        );
        self.last_profit = Some(profit);

        Ok(CycleReport {
            evaluation,
            current_price,
            balances,
            reserves,
            decision,
            execution,
            profit,
        })
    }

    /// Run a cycle and contain its failure
    pub async fn tick(&mut self) -> Option<CycleReport> {
        self.cycles += 1;
        tracing::info!(
            "⏰ Cycle {} at {}",
            self.cycles,
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );

        match self.run_cycle().await {
            Ok(report) => Some(report),
            Err(e) => {
                self.failed_cycles += 1;
                if e.is_insufficient_funds() {
                    tracing::warn!("❌ Trade failed, insufficient funds: {}", e);
                } else {
                    tracing::error!("❌ Cycle failed: {}", e);
                }
                None
            }
        }
    }

    /// Drive cycles on the poll interval until `shutdown` resolves
    ///
    /// `shutdown` is only observed between cycles, never while orders are in
    /// flight.
    pub async fn run<F>(&mut self, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "🔄 Trading {} every {:?} ({})",
            self.symbol,
            self.poll_interval,
            self.strategy.name()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown requested, stopping after {} cycles", self.cycles);
                    break;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.summary()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            runtime: self.started_at.elapsed(),
            cycles: self.cycles,
            failed_cycles: self.failed_cycles,
            last_total_profit: self.last_profit.map(|p| p.total_profit),
            realized_pnl: self.executor.state().realized_pnl,
        }
    }

    fn log_balances(&self, balances: &BalanceSnapshot, current_price: f64) {
        tracing::info!(
            "  {} {:.2} | {} {:.6} (≈ {:.2} {}) @ {:.2}",
            self.symbol.quote,
            balances.quote_asset_total,
            self.symbol.base,
            balances.base_asset_total,
            balances.base_asset_total * current_price,
            self.symbol.quote,
            current_price
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ExchangeError, PaperExchange};
    use crate::models::{Candle, Signal};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: start + ChronoDuration::minutes(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 10.0,
            })
            .collect()
    }

    fn rising() -> Vec<f64> {
        (0..15).map(|i| 100.0 + i as f64).collect()
    }

    fn settings() -> Settings {
        Settings::from_toml("[trading]\ninitial_quote_capital = 500.0\n").unwrap()
    }

    async fn engine(quote: f64, base: f64, price: f64) -> TradingEngine<PaperExchange> {
        let exchange = PaperExchange::new(
            BalanceSnapshot {
                quote_asset_total: quote,
                base_asset_total: base,
            },
            price,
        );
        TradingEngine::from_settings(exchange, &settings()).unwrap()
    }

    #[tokio::test]
    async fn test_short_history_still_reports_profit() {
        let mut engine = engine(500.0, 0.01, 100.0).await;
        engine.exchange().set_candles(candles(&[100.0, 101.0])).await;

        let report = engine.run_cycle().await.unwrap();

        assert!(report.evaluation.is_none());
        assert!(report.decision.is_none());
        assert!(report.execution.fills.is_empty());
        assert_eq!(report.profit.unrealized_total, 501.0);
        assert!(engine.exchange().orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_reserve_top_up_runs_without_signal() {
        let mut engine = engine(500.0, 0.0, 100.0).await;
        engine.exchange().set_candles(candles(&[100.0])).await;

        let report = engine.run_cycle().await.unwrap();

        assert!(report.reserves.placed_order());
        assert!((report.balances.base_asset_total - 0.001).abs() < 1e-12);
        // Reserve purchases are not trades
        assert_eq!(engine.state().last_buy_price, None);
    }

    #[tokio::test]
    async fn test_buy_cycle_uses_ticker_price() {
        let mut engine = engine(500.0, 0.01, 120.0).await;
        engine.exchange().set_candles(candles(&rising())).await;

        let report = engine.run_cycle().await.unwrap();

        assert_eq!(report.evaluation.map(|e| e.signal), Some(Signal::Buy));
        assert_eq!(report.execution.fills.len(), 3);
        assert!(report.execution.fills.iter().all(|f| f.fill_price == 120.0));
        assert_eq!(engine.state().last_buy_price, Some(120.0));
    }

    #[tokio::test]
    async fn test_out_of_order_candles_fail_the_cycle() {
        let mut engine = engine(500.0, 0.01, 100.0).await;
        let mut series = candles(&rising());
        series.swap(3, 4);
        engine.exchange().set_candles(series).await;

        assert!(engine.tick().await.is_none());
        let summary = engine.summary();
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.failed_cycles, 1);
    }

    #[tokio::test]
    async fn test_failed_order_is_contained() {
        let mut engine = engine(500.0, 0.01, 100.0).await;
        engine.exchange().set_candles(candles(&rising())).await;
        engine
            .exchange()
            .fail_next_order(ExchangeError::InsufficientFunds("rejected".to_string()))
            .await;

        assert!(engine.tick().await.is_none());
        assert!(engine.tick().await.is_some());

        let summary = engine.summary();
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.failed_cycles, 1);
        assert!(summary.last_total_profit.is_some());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut engine = engine(500.0, 0.01, 100.0)
            .await
            .with_poll_interval(Duration::from_secs(3600));
        engine.exchange().set_candles(candles(&[100.0, 100.0, 100.0])).await;

        let summary = engine
            .run(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        // The first tick fires immediately; the next is an hour away
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.failed_cycles, 0);
    }
}

use anyhow::Context;
use clap::Parser;
use spotbot::api::{OkxClient, PaperExchange};
use spotbot::config::Settings;
use spotbot::engine::TradingEngine;
use spotbot::models::BalanceSnapshot;
use spotbot::ExchangeClient;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "spotbot", about = "Moving-average spot trading loop for a single pair")]
struct Cli {
    /// Path to a TOML config file (defaults to ./spotbot.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trade against in-memory balances using live market data
    #[arg(long)]
    dry_run: bool,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    tracing::info!("🚀 spotbot starting");
    tracing::info!("\n📊 Configuration:");
    tracing::info!("  Pair: {} ({})", settings.market.symbol, settings.market.timeframe);
    tracing::info!(
        "  SMA {}/{}/{}  EMA {}/{}/{}",
        settings.indicators.sma.short,
        settings.indicators.sma.medium,
        settings.indicators.sma.long,
        settings.indicators.ema.short,
        settings.indicators.ema.medium,
        settings.indicators.ema.long
    );
    tracing::info!(
        "  Max trade {:.2}, batch {:.2}, sell unit {}",
        settings.trading.max_trade_quote,
        settings.trading.batch_size_quote,
        settings.trading.minimum_sell_unit
    );
    tracing::info!(
        "  Reserve floors: quote {:.2}, base {}",
        settings.reserves.quote_floor,
        settings.reserves.base_floor
    );
    tracing::info!("  Exchange: {:?}", settings.exchange);

    let okx = OkxClient::new(&settings.exchange).context("failed to build exchange client")?;

    if cli.dry_run {
        tracing::info!("🧪 Dry run: orders fill against paper balances");
        let balances = BalanceSnapshot {
            quote_asset_total: settings.trading.initial_quote_capital,
            base_asset_total: 0.0,
        };
        run(PaperExchange::with_market_data(okx, balances), &settings, cli.once).await
    } else {
        if !settings.exchange.has_credentials() {
            anyhow::bail!(
                "exchange credentials missing: set SPOTBOT__EXCHANGE__API_KEY, \
                 SPOTBOT__EXCHANGE__SECRET_KEY and SPOTBOT__EXCHANGE__PASSPHRASE or use --dry-run"
            );
        }
        run(okx, &settings, cli.once).await
    }
}

async fn run<E: ExchangeClient>(exchange: E, settings: &Settings, once: bool) -> anyhow::Result<()> {
    let mut engine =
        TradingEngine::from_settings(exchange, settings).context("invalid market settings")?;

    let summary = if once {
        engine.tick().await;
        engine.summary()
    } else {
        tracing::info!("\nPress Ctrl+C to stop...\n");
        engine
            .run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await
    };

    tracing::info!("⏳ Runtime: {:.2} minutes", summary.runtime_minutes());
    if let Some(profit) = summary.last_total_profit {
        tracing::info!("💰 Final total profit: {:.2}", profit);
    }
    tracing::info!("👋 spotbot stopped: {}", summary);
    Ok(())
}

fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("spotbot=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

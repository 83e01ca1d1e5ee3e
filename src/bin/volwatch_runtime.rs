//! Volwatch Runtime - scan loop with alert delivery
//!
//! This binary wires the scan engine together:
//! - Loads configuration (`.env` + environment) and validates it
//! - Opens the SQLite baseline store (or keeps baselines in memory)
//! - Creates the Binance and CoinGecko sources
//! - Delivers alerts to Telegram, or to the log when no token is set
//! - Runs the scan loop until CTRL+C
//!
//! Usage:
//!   cargo run --release --bin volwatch_runtime
//!
//! Environment variables:
//!   SCAN_INTERVAL_SECS - Delay between cycles (default: 30)
//!   ERROR_RETRY_DELAY_SECS - Delay after a failed cycle (default: 60)
//!   VOLWATCH_DB_PATH - SQLite database path (default: in-memory baselines)
//!   VOLWATCH_RULES_PATH - JSON rules file (default: built-in rules)
//!   TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_IDS - Telegram delivery

use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use volwatch::notify::{LogNotifier, Notifier, TelegramNotifier};
use volwatch::pipeline::{
    config::EngineConfig,
    cycle::{ScanCycle, ScanSettings},
    db::SqliteBaselineBackend,
    store::{BaselineBackend, InMemoryBaselineBackend},
};
use volwatch::sources::{BinanceSource, CoinGeckoSource, MarketDataSource};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Volwatch Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = EngineConfig::from_env()?;
    config.validate()?;

    info!("✅ Configuration loaded");
    info!("   ├─ Scan interval: {}s", config.scan_interval_secs);
    info!("   ├─ Error retry delay: {}s", config.error_retry_delay_secs);
    info!(
        "   ├─ Rotation periods: 1h={}s, 24h={}s",
        config.h1_rotation_secs, config.h24_rotation_secs
    );
    info!(
        "   ├─ Rules: {} ({})",
        config.rules.len(),
        config.rules_path.as_deref().unwrap_or("built-in")
    );
    info!("   └─ Quote asset: {}", config.binance_quote_asset);

    // Baseline storage
    let backend: Arc<dyn BaselineBackend> = match &config.db_path {
        Some(db_path) => {
            info!("🔧 Initializing database: {}", db_path);

            // Schema migrations are idempotent; skipped when the directory is absent
            Arc::new(SqliteBaselineBackend::open_with_migrations(
                db_path,
                &config.schema_dir,
            )?)
        }
        None => {
            info!("⚠️  VOLWATCH_DB_PATH not set, baselines are kept in memory");
            Arc::new(InMemoryBaselineBackend::new())
        }
    };

    // Market data sources
    let sources: Vec<Arc<dyn MarketDataSource>> = vec![
        Arc::new(BinanceSource::new(
            config.binance_ticker_url.clone(),
            config.binance_quote_asset.clone(),
            config.fetch_timeout_secs,
        )?),
        Arc::new(CoinGeckoSource::new(
            config.coingecko_markets_url.clone(),
            config.fetch_timeout_secs,
        )?),
    ];

    // Alert delivery
    let notifier: Arc<dyn Notifier> = match &config.telegram_bot_token {
        Some(token) => {
            info!("📨 Telegram delivery to {} chat(s)", config.telegram_chat_ids.len());
            Arc::new(TelegramNotifier::new(token.clone(), config.telegram_chat_ids.clone())?)
        }
        None => {
            info!("⚠️  TELEGRAM_BOT_TOKEN not set, alerts go to the log only");
            Arc::new(LogNotifier::new())
        }
    };

    let mut cycle = ScanCycle::new(
        sources,
        backend,
        notifier,
        config.rules.clone(),
        ScanSettings::from(&config),
    );

    info!("🔄 Press CTRL+C to shutdown gracefully");

    tokio::select! {
        _ = cycle.run_forever() => {}
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
                Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
            }
        }
    }

    info!("✅ Volwatch runtime stopped");
    Ok(())
}

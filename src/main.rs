// =============================================================================
// AMIN Market Data Collector — Main Entry Point
// =============================================================================
//
// Sets up logging, loads configuration once, connects to every exchange with
// credentials, then polls OHLCV for the configured symbols until Ctrl+C.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod collector;
mod config;
mod error;
mod exchange;
mod market_data;
mod poller;

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::collector::MarketDataCollector;
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & logging ─────────────────────────────────────────
    let _ = dotenv::dotenv();

    // The subscriber must exist before `Config` is built so validation
    // warnings reach the log.
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::level_filter(&level))),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    info!(
        environment = %config.environment,
        log_filter = %config.tracing_filter(),
        symbols = ?config.data.symbols,
        polling_interval = config.data.polling_interval,
        firebase_collection = %config.firebase.collection_name,
        "AMIN market data collector starting"
    );
    info!(
        firebase_project = %config.firebase.project_id,
        credentials_path = %config.firebase.credentials_path,
        prediction_horizon = config.model.prediction_horizon,
        confidence_threshold = config.model.confidence_threshold,
        retrain_interval = config.model.retrain_interval,
        "downstream settings"
    );

    let active = config.get_active_exchanges();
    if active.is_empty() {
        warn!("no exchange has both API key and secret configured");
    }
    info!(exchanges = ?active, "active exchanges");

    // ── 2. Connect exchanges ─────────────────────────────────────────────
    let collector = Arc::new(MarketDataCollector::new(&config).await);
    for name in active.iter().filter(|name| !collector.is_live(name)) {
        warn!(exchange = %name, "configured exchange is not live");
    }
    if collector.live_exchanges().is_empty() {
        warn!("no exchange passed the connectivity check; every poll will come back empty");
    }

    // Warm-up fetch with the default timeframe and limit.
    if let Some(symbol) = config.data.symbols.first() {
        match collector.fetch_ohlcv_default(symbol).await {
            Some(frame) => info!(symbol = %symbol, exchange = %frame.exchange, rows = frame.len(), "warm-up fetch ok"),
            None => warn!(symbol = %symbol, "warm-up fetch returned no data"),
        }
    }

    // ── 3. Poll until shutdown ───────────────────────────────────────────
    let poll = tokio::spawn(poller::run_poll_loop(collector.clone(), config.data.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    warn!("Shutdown signal received, stopping");

    poll.abort();
    if collector.cache().is_empty() {
        warn!("collector shut down without caching any series");
    } else {
        info!(cached_series = collector.cache().len(), "collector shut down");
    }
    Ok(())
}

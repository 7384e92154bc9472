// =============================================================================
// Poller — fetches every configured symbol once per polling interval
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::collector::{MarketDataCollector, DEFAULT_TIMEFRAME};
use crate::config::DataSettings;
use crate::market_data::CacheKey;

/// Outcome of one poll round.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    /// (symbol, exchange that answered, rows)
    pub fetched: Vec<(String, String, usize)>,
    /// Symbols no live exchange could serve.
    pub missing: Vec<String>,
}

/// Fetch every symbol once. Symbols are requested concurrently; calls to a
/// single exchange are still spaced by its throttle.
pub async fn poll_once(
    collector: &MarketDataCollector,
    symbols: &[String],
    timeframe: &str,
    limit: u32,
) -> PollReport {
    let fetches = symbols
        .iter()
        .map(|symbol| collector.fetch_ohlcv(symbol, timeframe, limit, None));
    let results = join_all(fetches).await;

    let mut report = PollReport::default();
    for (symbol, result) in symbols.iter().zip(results) {
        match result {
            Some(frame) => {
                debug!(symbol = %symbol, exchange = %frame.exchange, rows = frame.len(), "symbol polled");
                report.fetched.push((symbol.clone(), frame.exchange, frame.rows.len()));
            }
            None => report.missing.push(symbol.clone()),
        }
    }
    report
}

/// Newest close per fetched symbol, read back from the collector's cache.
pub fn latest_closes(
    collector: &MarketDataCollector,
    report: &PollReport,
    timeframe: &str,
) -> Vec<(String, f64)> {
    report
        .fetched
        .iter()
        .filter_map(|(symbol, exchange, _)| {
            collector
                .cache()
                .last_close(&CacheKey::new(exchange, symbol, timeframe))
                .map(|close| (symbol.clone(), close))
        })
        .collect()
}

fn log_round_detail(collector: &MarketDataCollector, report: &PollReport, timeframe: &str) {
    for (symbol, exchange, _) in &report.fetched {
        let Some(cached) = collector.latest(exchange, symbol, timeframe) else {
            continue;
        };
        let Some(s) = cached.frame.summary() else {
            continue;
        };
        debug!(
            symbol = %symbol,
            exchange = %exchange,
            fetched_at = %cached.fetched_at,
            from = %s.first,
            to = %s.last,
            open = s.open,
            high = s.high,
            low = s.low,
            close = s.close,
            volume = s.volume,
            "cached series"
        );
    }
}

/// Poll forever at `settings.polling_interval`. Each round requests
/// `settings.window_size` candles per symbol.
pub async fn run_poll_loop(collector: Arc<MarketDataCollector>, settings: DataSettings) {
    let period = Duration::from_secs(settings.polling_interval.max(1));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        symbols = ?settings.symbols,
        every_secs = period.as_secs(),
        window = settings.window_size,
        "poll loop starting"
    );

    loop {
        interval.tick().await;

        let report = poll_once(
            &collector,
            &settings.symbols,
            DEFAULT_TIMEFRAME,
            settings.window_size,
        )
        .await;

        log_round_detail(&collector, &report, DEFAULT_TIMEFRAME);
        let closes = latest_closes(&collector, &report, DEFAULT_TIMEFRAME);

        if report.missing.is_empty() {
            info!(fetched = report.fetched.len(), closes = ?closes, "poll round complete");
        } else {
            warn!(
                fetched = report.fetched.len(),
                missing = ?report.missing,
                closes = ?closes,
                "poll round incomplete"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ExchangeError;
    use crate::exchange::mock::{self, MockExchange};

    fn binance_only() -> Config {
        Config::from_lookup(|k| match k {
            "BINANCE_API_KEY" | "BINANCE_API_SECRET" => Some("x".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn poll_round_fetches_every_symbol() {
        let config = binance_only();
        let binance = Arc::new(MockExchange::ok("binance"));
        let collector =
            MarketDataCollector::with_factory(&config, mock::factory(vec![binance.clone()])).await;

        let report = poll_once(&collector, &config.data.symbols, "1m", 100).await;

        assert_eq!(report.fetched.len(), 2);
        assert!(report.missing.is_empty());
        assert_eq!(report.fetched[0], ("BTC/USDT".to_string(), "binance".to_string(), 2));
        assert_eq!(binance.call_count(), 2);
        assert_eq!(collector.cache().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_round_still_spaces_calls() {
        let config = binance_only();
        let binance = Arc::new(MockExchange::ok("binance"));
        let collector =
            MarketDataCollector::with_factory(&config, mock::factory(vec![binance.clone()])).await;

        poll_once(&collector, &config.data.symbols, "1m", 100).await;

        let mut calls = binance.calls();
        calls.sort();
        assert!(calls[1].duration_since(calls[0]) >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn latest_closes_come_from_cache() {
        let config = binance_only();
        let binance = Arc::new(MockExchange::ok("binance"));
        let collector =
            MarketDataCollector::with_factory(&config, mock::factory(vec![binance])).await;

        let report = poll_once(&collector, &config.data.symbols, "1m", 100).await;
        let closes = latest_closes(&collector, &report, "1m");
        assert_eq!(
            closes,
            vec![("BTC/USDT".to_string(), 12.0), ("ETH/USDT".to_string(), 12.0)]
        );

        // Nothing was cached under another timeframe.
        assert!(latest_closes(&collector, &report, "5m").is_empty());
    }

    #[tokio::test]
    async fn unserved_symbols_are_reported_missing() {
        let config = binance_only();
        let binance = Arc::new(MockExchange {
            fetch_error: Some(ExchangeError::BadRequest("Invalid symbol.".into())),
            ..MockExchange::ok("binance")
        });
        let collector =
            MarketDataCollector::with_factory(&config, mock::factory(vec![binance])).await;

        let symbols = vec!["DOGE/XYZ".to_string()];
        let report = poll_once(&collector, &symbols, "1m", 10).await;
        assert!(report.fetched.is_empty());
        assert_eq!(report.missing, symbols);
    }
}

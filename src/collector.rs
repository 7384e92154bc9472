// =============================================================================
// Market Data Collector — one live client per active exchange, OHLCV fetches
// =============================================================================
//
// Initialisation never fails as a whole: an exchange whose connectivity check
// fails is logged and left out of the live set. Fetches walk the candidate
// exchanges in order and return the first non-empty result; an error on one
// exchange is logged and the next one is tried.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{Config, ExchangeConfig};
use crate::error::ExchangeError;
use crate::exchange::{ExchangeClient, RequestThrottle, SupportedExchange};
use crate::market_data::{CacheKey, CachedFrame, MarketDataCache, OhlcvFrame};

pub const DEFAULT_TIMEFRAME: &str = "1m";
pub const DEFAULT_LIMIT: u32 = 100;

/// A connected exchange and its request spacing state.
struct LiveExchange {
    client: Arc<dyn ExchangeClient>,
    throttle: RequestThrottle,
}

pub struct MarketDataCollector {
    exchanges: BTreeMap<String, LiveExchange>,
    cache: MarketDataCache,
}

impl MarketDataCollector {
    /// Connect to every active, supported exchange in `config`.
    pub async fn new(config: &Config) -> Self {
        Self::with_factory(config, |kind, cfg| kind.build(cfg)).await
    }

    /// Like [`new`](Self::new) but with a caller-supplied client constructor.
    pub async fn with_factory<F>(config: &Config, factory: F) -> Self
    where
        F: Fn(SupportedExchange, &ExchangeConfig) -> Result<Arc<dyn ExchangeClient>, ExchangeError>,
    {
        let mut exchanges = BTreeMap::new();

        for name in config.get_active_exchanges() {
            let Some(kind) = SupportedExchange::from_name(&name) else {
                let e = ExchangeError::Unsupported(name.clone());
                warn!(error = %e, "exchange has credentials but is not supported, skipping");
                continue;
            };
            let Some(ex_cfg) = config.exchanges.get(&name) else {
                continue;
            };

            let connected = match factory(kind, ex_cfg) {
                Ok(client) => match client.load_markets().await {
                    Ok(markets) => Ok((client, markets)),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            match connected {
                Ok((client, markets)) => {
                    let throttle = RequestThrottle::new(client.rate_limit());
                    info!(
                        exchange = %name,
                        client = client.name(),
                        markets,
                        min_interval_ms = throttle.min_interval().as_millis() as u64,
                        "successfully connected"
                    );
                    exchanges.insert(name, LiveExchange { client, throttle });
                }
                Err(ExchangeError::Authentication(msg)) => {
                    error!(exchange = %name, error = %msg, "authentication failed");
                }
                Err(e) if e.is_network() => {
                    error!(exchange = %name, error = %e, "network error");
                }
                Err(e) => {
                    error!(exchange = %name, error = %e, "failed to initialise");
                }
            }
        }

        info!(live = exchanges.len(), "market data collector ready");

        Self {
            exchanges,
            cache: MarketDataCache::new(),
        }
    }

    /// Names of exchanges that passed the connectivity check.
    pub fn live_exchanges(&self) -> Vec<String> {
        self.exchanges.keys().cloned().collect()
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.exchanges.contains_key(name)
    }

    /// Fetch OHLCV candles as a table.
    ///
    /// With `exchange = None` every live exchange is tried in order until one
    /// returns data. Returns `None` when no candidate is live or all attempts
    /// fail or come back empty.
    pub async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
        exchange: Option<&str>,
    ) -> Option<OhlcvFrame> {
        let candidates: Vec<&str> = match exchange {
            Some(name) => vec![name],
            None => self.exchanges.keys().map(String::as_str).collect(),
        };

        for name in candidates {
            let Some(live) = self.exchanges.get(name) else {
                debug!(exchange = name, "no live client, skipping");
                continue;
            };

            let result = live
                .throttle
                .run(live.client.fetch_ohlcv(symbol, timeframe, limit))
                .await;

            let candles = match result {
                Ok(candles) => candles,
                Err(e) => {
                    warn!(exchange = name, symbol, timeframe, error = %e, "OHLCV fetch failed");
                    continue;
                }
            };

            if candles.is_empty() {
                warn!(exchange = name, symbol, timeframe, "exchange returned no candles");
                continue;
            }

            match OhlcvFrame::from_candles(name, symbol, timeframe, &candles) {
                Ok(frame) => {
                    debug!(
                        exchange = name,
                        symbol,
                        timeframe,
                        rows = frame.len(),
                        columns = ?frame.columns(),
                        "OHLCV fetched"
                    );
                    self.cache.insert(frame.clone());
                    return Some(frame);
                }
                Err(e) => {
                    warn!(exchange = name, symbol, error = %e, "could not shape OHLCV table");
                }
            }
        }

        None
    }

    /// [`fetch_ohlcv`](Self::fetch_ohlcv) with the default timeframe and limit
    /// across all live exchanges.
    pub async fn fetch_ohlcv_default(&self, symbol: &str) -> Option<OhlcvFrame> {
        self.fetch_ohlcv(symbol, DEFAULT_TIMEFRAME, DEFAULT_LIMIT, None)
            .await
    }

    /// Most recent successful fetch for the key, if any.
    pub fn latest(&self, exchange: &str, symbol: &str, timeframe: &str) -> Option<CachedFrame> {
        self.cache.get(&CacheKey::new(exchange, symbol, timeframe))
    }

    pub fn cache(&self) -> &MarketDataCache {
        &self.cache
    }
}

impl std::fmt::Debug for MarketDataCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataCollector")
            .field("exchanges", &self.exchanges.keys().collect::<Vec<_>>())
            .field("cache", &self.cache)
            .finish()
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::OhlcvFrame;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Identifies one cached series.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct CacheKey {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: String,
}

impl CacheKey {
    pub fn new(exchange: &str, symbol: &str, timeframe: &str) -> Self {
        Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.exchange, self.symbol, self.timeframe)
    }
}

/// A frame together with the wall-clock time it was fetched.
#[derive(Debug, Clone)]
pub struct CachedFrame {
    pub frame: OhlcvFrame,
    pub fetched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// MarketDataCache
// ---------------------------------------------------------------------------

/// Thread-safe store of the most recent fetch per (exchange, symbol,
/// timeframe). A newer fetch replaces the older one wholesale.
pub struct MarketDataCache {
    frames: RwLock<HashMap<CacheKey, CachedFrame>>,
}

impl MarketDataCache {
    pub fn new() -> Self {
        Self {
            frames: RwLock::new(HashMap::new()),
        }
    }

    /// Store `frame` under its own (exchange, symbol, timeframe).
    pub fn insert(&self, frame: OhlcvFrame) {
        let key = CacheKey::new(&frame.exchange, &frame.symbol, &frame.timeframe);
        self.frames.write().insert(
            key,
            CachedFrame {
                frame,
                fetched_at: Utc::now(),
            },
        );
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedFrame> {
        self.frames.read().get(key).cloned()
    }

    /// Close of the newest row in the cached frame, if any.
    pub fn last_close(&self, key: &CacheKey) -> Option<f64> {
        self.frames
            .read()
            .get(key)
            .and_then(|c| c.frame.last().map(|r| r.close))
    }

    pub fn len(&self) -> usize {
        self.frames.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.read().is_empty()
    }
}

impl Default for MarketDataCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MarketDataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketDataCache")
            .field("entries", &self.len())
            .finish()
    }
}

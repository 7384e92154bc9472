pub mod cache;
pub mod ohlcv;

pub use cache::{CacheKey, CachedFrame, MarketDataCache};
pub use ohlcv::{Ohlcv, OhlcvFrame};

pub mod binance;
pub mod coinbase;
pub mod http;
pub mod throttle;

#[cfg(test)]
pub mod mock;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::market_data::Ohlcv;

pub use binance::BinanceClient;
pub use coinbase::CoinbaseClient;
pub use throttle::RequestThrottle;

/// Minimal surface the collector needs from an exchange connection.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Lower-case exchange id, e.g. `"binance"`.
    fn name(&self) -> &str;

    /// Configured request budget in requests per second.
    fn rate_limit(&self) -> u32;

    /// Load market metadata; doubles as the connectivity check. Returns the
    /// number of markets listed.
    async fn load_markets(&self) -> Result<usize, ExchangeError>;

    /// Fetch up to `limit` candles for a unified `BASE/QUOTE` symbol.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Ohlcv>, ExchangeError>;
}

/// Exchanges this crate knows how to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedExchange {
    Binance,
    Coinbase,
}

impl SupportedExchange {
    #[cfg(test)]
    pub const ALL: [SupportedExchange; 2] = [Self::Binance, Self::Coinbase];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "binance" => Some(Self::Binance),
            "coinbase" => Some(Self::Coinbase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Coinbase => "coinbase",
        }
    }

    /// Construct a spot-market client from configured credentials.
    pub fn build(&self, cfg: &ExchangeConfig) -> Result<Arc<dyn ExchangeClient>, ExchangeError> {
        Ok(match self {
            Self::Binance => Arc::new(BinanceClient::new(cfg)?),
            Self::Coinbase => Arc::new(CoinbaseClient::new(cfg)?),
        })
    }
}

impl std::fmt::Display for SupportedExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Scripted in-memory exchange for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ExchangeClient, SupportedExchange};
use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::market_data::Ohlcv;

/// Records when each fetch reached it; can fail either call on demand.
pub struct MockExchange {
    pub name: String,
    pub rate_limit: u32,
    pub load_error: Option<ExchangeError>,
    pub fetch_error: Option<ExchangeError>,
    pub candles: Vec<Ohlcv>,
    pub calls: Mutex<Vec<Instant>>,
}

impl MockExchange {
    /// Healthy exchange at 20 req/s returning two one-minute candles.
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rate_limit: 20,
            load_error: None,
            fetch_error: None,
            candles: vec![
                Ohlcv::new(1_700_000_000_000, 10.0, 12.0, 9.0, 11.0, 100.0),
                Ohlcv::new(1_700_000_060_000, 11.0, 13.0, 10.0, 12.0, 150.0),
            ],
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_load(name: &str, err: ExchangeError) -> Self {
        Self {
            load_error: Some(err),
            ..Self::ok(name)
        }
    }

    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn rate_limit(&self) -> u32 {
        self.rate_limit
    }

    async fn load_markets(&self) -> Result<usize, ExchangeError> {
        match &self.load_error {
            Some(e) => Err(e.clone()),
            None => Ok(2),
        }
    }

    async fn fetch_ohlcv(
        &self,
        _symbol: &str,
        _timeframe: &str,
        _limit: u32,
    ) -> Result<Vec<Ohlcv>, ExchangeError> {
        self.calls.lock().push(Instant::now());
        match &self.fetch_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.candles.clone()),
        }
    }
}

/// Client factory that hands out the given mocks by exchange name.
pub fn factory(
    mocks: Vec<Arc<MockExchange>>,
) -> impl Fn(SupportedExchange, &ExchangeConfig) -> Result<Arc<dyn ExchangeClient>, ExchangeError> {
    let by_name: HashMap<String, Arc<MockExchange>> =
        mocks.into_iter().map(|m| (m.name.clone(), m)).collect();

    move |kind: SupportedExchange, _cfg: &ExchangeConfig| {
        by_name
            .get(kind.as_str())
            .cloned()
            .map(|m| m as Arc<dyn ExchangeClient>)
            .ok_or_else(|| ExchangeError::Unsupported(kind.to_string()))
    }
}

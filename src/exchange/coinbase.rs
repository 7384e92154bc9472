// =============================================================================
// Coinbase Advanced Trade REST client — products and candles
// =============================================================================
//
// Every request is signed: CB-ACCESS-SIGN is the hex HMAC-SHA256 of
// `timestamp + METHOD + path` keyed with the API secret. The query string is
// not part of the signed path. Timestamps are shifted by the server offset
// measured in `load_markets`.
// =============================================================================

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use tracing::{debug, instrument};

use super::http;
use super::ExchangeClient;
use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::market_data::Ohlcv;

type HmacSha256 = Hmac<Sha256>;

const BASE_URL: &str = "https://api.coinbase.com";

const PRODUCTS_PATH: &str = "/api/v3/brokerage/products";
const TIME_PATH: &str = "/api/v3/brokerage/time";

/// Largest candle count the candles endpoint returns per request.
const MAX_CANDLES: u32 = 350;

/// Coinbase Advanced Trade client.
pub struct CoinbaseClient {
    api_key: String,
    secret: String,
    base_url: String,
    rate_limit: u32,
    /// `server_time - local_time`, in seconds.
    time_offset_secs: AtomicI64,
    client: reqwest::Client,
}

impl CoinbaseClient {
    pub fn new(cfg: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let client = http::build_http_client(cfg.timeout, HeaderMap::new())?;

        debug!(base_url = BASE_URL, "CoinbaseClient initialised");

        Ok(Self {
            api_key: cfg.api_key.clone(),
            secret: cfg.api_secret.clone(),
            base_url: BASE_URL.to_string(),
            rate_limit: cfg.rate_limit,
            time_offset_secs: AtomicI64::new(0),
            client,
        })
    }

    /// Hex HMAC-SHA256 over `timestamp + method + path`.
    pub fn sign(&self, timestamp: &str, method: &str, path: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(timestamp.as_bytes());
        mac.update(method.as_bytes());
        mac.update(path.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn now_secs(&self) -> i64 {
        http::timestamp_ms() / 1000 + self.time_offset_secs.load(Ordering::Relaxed)
    }

    /// Signed GET. `query` is appended to the URL but excluded from the
    /// signature.
    async fn get(&self, path: &str, query: &str) -> Result<serde_json::Value, ExchangeError> {
        let ts = self.now_secs().to_string();
        let sig = self.sign(&ts, "GET", path);

        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("CB-ACCESS-KEY", self.api_key.as_str()),
            ("CB-ACCESS-SIGN", sig.as_str()),
            ("CB-ACCESS-TIMESTAMP", ts.as_str()),
        ] {
            let val = HeaderValue::from_str(value).map_err(|_| {
                ExchangeError::Authentication(format!("{name} contains invalid header characters"))
            })?;
            headers.insert(name, val);
        }

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };
        let context = format!("GET {path}");

        let resp = http::send_json(self.client.get(&url).headers(headers), &context).await?;
        Ok(resp.body)
    }

    /// GET /api/v3/brokerage/time (public); stores the clock difference.
    #[instrument(skip(self), name = "coinbase::sync_time")]
    async fn sync_time(&self) -> Result<i64, ExchangeError> {
        let url = format!("{}{}", self.base_url, TIME_PATH);
        let resp = http::send_json(self.client.get(&url), "GET /api/v3/brokerage/time").await?;

        let server = resp.body["epochSeconds"]
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| resp.body["epochSeconds"].as_i64())
            .ok_or_else(|| {
                ExchangeError::InvalidResponse("time response missing 'epochSeconds'".into())
            })?;

        let offset = server - http::timestamp_ms() / 1000;
        self.time_offset_secs.store(offset, Ordering::Relaxed);
        debug!(offset_secs = offset, "server time offset measured");
        Ok(offset)
    }
}

#[async_trait]
impl ExchangeClient for CoinbaseClient {
    fn name(&self) -> &str {
        "coinbase"
    }

    fn rate_limit(&self) -> u32 {
        self.rate_limit
    }

    #[instrument(skip(self), name = "coinbase::load_markets")]
    async fn load_markets(&self) -> Result<usize, ExchangeError> {
        self.sync_time().await?;

        let body = self.get(PRODUCTS_PATH, "").await?;
        let count = body["products"]
            .as_array()
            .map(Vec::len)
            .ok_or_else(|| {
                ExchangeError::InvalidResponse("products response missing 'products'".into())
            })?;

        debug!(markets = count, "markets loaded");
        Ok(count)
    }

    #[instrument(skip(self), name = "coinbase::fetch_ohlcv")]
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Ohlcv>, ExchangeError> {
        let (granularity, step_secs) = granularity(timeframe).ok_or_else(|| {
            ExchangeError::BadRequest(format!("unsupported timeframe for coinbase: {timeframe}"))
        })?;

        let limit = i64::from(limit.clamp(1, MAX_CANDLES));
        let end = self.now_secs();
        let start = end - limit * step_secs;

        let path = format!("{PRODUCTS_PATH}/{}/candles", product_id(symbol));
        let query = format!("start={start}&end={end}&granularity={granularity}");

        let body = self.get(&path, &query).await?;
        let mut candles = parse_candles(&body)?;
        candles.sort_by_key(|c| c.timestamp_ms);
        // The window can straddle one extra bucket; keep the newest `limit`.
        let excess = candles.len().saturating_sub(limit as usize);
        candles.drain(..excess);

        debug!(symbol, timeframe, count = candles.len(), "candles fetched");
        Ok(candles)
    }
}

impl std::fmt::Debug for CoinbaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinbaseClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

/// `BTC/USD` → `BTC-USD`.
pub fn product_id(symbol: &str) -> String {
    let (base, quote) = http::split_symbol(symbol);
    if quote.is_empty() {
        base.to_uppercase()
    } else {
        format!("{base}-{quote}").to_uppercase()
    }
}

/// Timeframe → (granularity enum, bucket width in seconds).
pub fn granularity(timeframe: &str) -> Option<(&'static str, i64)> {
    Some(match timeframe {
        "1m" => ("ONE_MINUTE", 60),
        "5m" => ("FIVE_MINUTE", 300),
        "15m" => ("FIFTEEN_MINUTE", 900),
        "30m" => ("THIRTY_MINUTE", 1800),
        "1h" => ("ONE_HOUR", 3600),
        "2h" => ("TWO_HOUR", 7200),
        "6h" => ("SIX_HOUR", 21_600),
        "1d" => ("ONE_DAY", 86_400),
        _ => return None,
    })
}

/// Parse `{"candles": [{"start": "<secs>", "open": "..", ...}]}`.
pub fn parse_candles(body: &serde_json::Value) -> Result<Vec<Ohlcv>, ExchangeError> {
    let raw = body["candles"]
        .as_array()
        .ok_or_else(|| ExchangeError::InvalidResponse("candles response missing 'candles'".into()))?;

    raw.iter()
        .map(|c| {
            Ok(Ohlcv::new(
                http::parse_str_i64(&c["start"])? * 1000,
                http::parse_str_f64(&c["open"])?,
                http::parse_str_f64(&c["high"])?,
                http::parse_str_f64(&c["low"])?,
                http::parse_str_f64(&c["close"])?,
                http::parse_str_f64(&c["volume"])?,
            ))
        })
        .collect()
}

// =============================================================================
// Binance Spot REST client — market metadata, klines, credential check
// =============================================================================
//
// SECURITY: The secret key is never logged or serialized. Signed requests send
// X-MBX-APIKEY as a header and a recvWindow of 5 000 ms. Timestamps are
// shifted by the measured server clock offset.
// =============================================================================

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use sha2::Sha256;
use tracing::{debug, instrument, warn};

use super::http::{self, RawResponse};
use super::throttle::UsedWeightTracker;
use super::ExchangeClient;
use crate::config::ExchangeConfig;
use crate::error::ExchangeError;
use crate::market_data::Ohlcv;

type HmacSha256 = Hmac<Sha256>;

const BASE_URL: &str = "https://api.binance.com";

/// Default recv-window sent with every signed request (milliseconds).
const RECV_WINDOW: u64 = 5000;

/// Largest `limit` accepted by /api/v3/klines.
const MAX_KLINES: u32 = 1000;

/// Kline intervals accepted by Binance spot.
const INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

/// Binance error codes that mean the key or signature was rejected.
const AUTH_ERROR_CODES: &[i64] = &[-1022, -2014, -2015];

/// Binance spot client with HMAC-SHA256 request signing.
pub struct BinanceClient {
    api_key: String,
    secret: String,
    base_url: String,
    rate_limit: u32,
    /// `server_time - local_time`, in ms.
    time_offset_ms: AtomicI64,
    weight: UsedWeightTracker,
    client: reqwest::Client,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(cfg: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let mut default_headers = HeaderMap::new();
        if !cfg.api_key.is_empty() {
            let val = HeaderValue::from_str(&cfg.api_key).map_err(|_| {
                ExchangeError::Authentication("API key contains invalid header characters".into())
            })?;
            default_headers.insert("X-MBX-APIKEY", val);
        }

        let client = http::build_http_client(cfg.timeout, default_headers)?;

        debug!(base_url = BASE_URL, "BinanceClient initialised");

        Ok(Self {
            api_key: cfg.api_key.clone(),
            secret: cfg.api_secret.clone(),
            base_url: BASE_URL.to_string(),
            rate_limit: cfg.rate_limit,
            time_offset_ms: AtomicI64::new(0),
            weight: UsedWeightTracker::new(),
            client,
        })
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret.is_empty()
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Produce an HMAC-SHA256 hex signature of `query`.
    pub fn sign(&self, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Local clock adjusted by the last measured server offset.
    fn server_timestamp_ms(&self) -> i64 {
        http::timestamp_ms() + self.time_offset_ms.load(Ordering::Relaxed)
    }

    /// Build the full query string for a signed request.
    fn signed_query(&self, params: &str) -> String {
        let ts = self.server_timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    async fn get(&self, path_and_query: &str, context: &str) -> Result<serde_json::Value, ExchangeError> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let RawResponse {
            status,
            headers,
            body,
        } = http::send_raw(self.client.get(&url), context).await?;

        self.weight.update_from_headers(&headers);

        if !status.is_success() {
            return Err(classify_error(status, context, &body));
        }
        Ok(body)
    }

    /// GET /api/v3/time; stores the server/local clock difference.
    #[instrument(skip(self), name = "binance::sync_time")]
    async fn sync_time(&self) -> Result<i64, ExchangeError> {
        let before = http::timestamp_ms();
        let body = self.get("/api/v3/time", "GET /api/v3/time").await?;
        let after = http::timestamp_ms();

        let server = body["serverTime"].as_i64().ok_or_else(|| {
            ExchangeError::InvalidResponse("time response missing 'serverTime'".into())
        })?;
        let offset = server - (before + after) / 2;
        self.time_offset_ms.store(offset, Ordering::Relaxed);

        debug!(offset_ms = offset, "server time offset measured");
        Ok(offset)
    }

    /// GET /api/v3/account (signed). Used only to confirm the credentials.
    #[instrument(skip(self), name = "binance::verify_credentials")]
    async fn verify_credentials(&self) -> Result<(), ExchangeError> {
        let qs = self.signed_query("");
        self.get(&format!("/api/v3/account?{qs}"), "GET /api/v3/account")
            .await?;
        debug!("credentials accepted");
        Ok(())
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    fn rate_limit(&self) -> u32 {
        self.rate_limit
    }

    #[instrument(skip(self), name = "binance::load_markets")]
    async fn load_markets(&self) -> Result<usize, ExchangeError> {
        self.sync_time().await?;

        let body = self
            .get("/api/v3/exchangeInfo", "GET /api/v3/exchangeInfo")
            .await?;
        let count = body["symbols"]
            .as_array()
            .map(Vec::len)
            .ok_or_else(|| {
                ExchangeError::InvalidResponse("exchangeInfo response missing 'symbols'".into())
            })?;

        if self.has_credentials() {
            self.verify_credentials().await?;
        }

        debug!(markets = count, "markets loaded");
        Ok(count)
    }

    /// GET /api/v3/klines (public).
    #[instrument(skip(self), name = "binance::fetch_ohlcv")]
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Ohlcv>, ExchangeError> {
        if !INTERVALS.contains(&timeframe) {
            return Err(ExchangeError::BadRequest(format!(
                "unsupported timeframe for binance: {timeframe}"
            )));
        }

        let market = market_id(symbol);
        let limit = limit.clamp(1, MAX_KLINES);
        let path = format!("/api/v3/klines?symbol={market}&interval={timeframe}&limit={limit}");

        let body = self.get(&path, "GET /api/v3/klines").await?;
        let candles = parse_klines(&body)?;

        debug!(symbol, timeframe, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .field("weight", &self.weight)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// Parsing helpers
// -----------------------------------------------------------------------------

/// `BTC/USDT` → `BTCUSDT`.
pub fn market_id(symbol: &str) -> String {
    let (base, quote) = http::split_symbol(symbol);
    format!("{base}{quote}").to_uppercase()
}

/// Binance reports auth failures both as 401 and as coded 400s.
fn classify_error(
    status: reqwest::StatusCode,
    context: &str,
    body: &serde_json::Value,
) -> ExchangeError {
    if let Some(code) = body["code"].as_i64() {
        if AUTH_ERROR_CODES.contains(&code) {
            return ExchangeError::Authentication(format!(
                "{context} returned {status}: {body}"
            ));
        }
    }
    http::classify_status(status, context, body)
}

/// Parse Binance's array-of-arrays kline payload.
///
/// Array indices:
///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume, ...
pub fn parse_klines(body: &serde_json::Value) -> Result<Vec<Ohlcv>, ExchangeError> {
    let raw = body
        .as_array()
        .ok_or_else(|| ExchangeError::InvalidResponse("klines response is not an array".into()))?;

    let mut candles = Vec::with_capacity(raw.len());
    for entry in raw {
        let arr = entry
            .as_array()
            .ok_or_else(|| ExchangeError::InvalidResponse("kline entry is not an array".into()))?;

        if arr.len() < 6 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        candles.push(Ohlcv::new(
            http::parse_str_i64(&arr[0])?,
            http::parse_str_f64(&arr[1])?,
            http::parse_str_f64(&arr[2])?,
            http::parse_str_f64(&arr[3])?,
            http::parse_str_f64(&arr[4])?,
            http::parse_str_f64(&arr[5])?,
        ));
    }
    Ok(candles)
}

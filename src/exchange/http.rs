// =============================================================================
// Shared REST plumbing — client construction, status classification, parsing
// =============================================================================

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::error::ExchangeError;

/// Build a `reqwest::Client` with the exchange's timeout and default headers.
pub fn build_http_client(
    timeout_secs: u64,
    default_headers: HeaderMap,
) -> Result<reqwest::Client, ExchangeError> {
    reqwest::Client::builder()
        .default_headers(default_headers)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))
}

/// Map a non-success HTTP status to an [`ExchangeError`] kind.
pub fn classify_status(status: StatusCode, context: &str, body: &serde_json::Value) -> ExchangeError {
    let msg = format!("{context} returned {status}: {body}");
    match status.as_u16() {
        401 | 403 => ExchangeError::Authentication(msg),
        418 | 429 => ExchangeError::RateLimited(msg),
        500..=599 => ExchangeError::Network(msg),
        _ => ExchangeError::BadRequest(msg),
    }
}

/// Decoded response with the status left for the caller to judge.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

/// Send `req`, then decode the body as JSON and classify non-2xx statuses.
pub async fn send_json(
    req: reqwest::RequestBuilder,
    context: &str,
) -> Result<RawResponse, ExchangeError> {
    let raw = send_raw(req, context).await?;
    if !raw.status.is_success() {
        return Err(classify_status(raw.status, context, &raw.body));
    }
    Ok(raw)
}

/// Send `req` and decode the body. Only transport and decoding failures are
/// errors here; a non-2xx status is returned as-is.
pub async fn send_raw(
    req: reqwest::RequestBuilder,
    context: &str,
) -> Result<RawResponse, ExchangeError> {
    let resp = req
        .send()
        .await
        .map_err(|e| ExchangeError::Network(format!("{context} request failed: {e}")))?;

    let status = resp.status();
    let headers = resp.headers().clone();
    let text = resp
        .text()
        .await
        .map_err(|e| ExchangeError::Network(format!("{context} body read failed: {e}")))?;

    let body: serde_json::Value = if text.is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_str(&text) {
            Ok(v) => v,
            // Error pages from proxies are usually HTML; keep the status meaningful.
            Err(_) if !status.is_success() => serde_json::Value::String(text),
            Err(e) => {
                return Err(ExchangeError::InvalidResponse(format!(
                    "failed to parse {context} response: {e}"
                )))
            }
        }
    };

    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

/// Parse a JSON value that may be either a string or a number into `f64`.
pub fn parse_str_f64(val: &serde_json::Value) -> Result<f64, ExchangeError> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .map_err(|_| ExchangeError::InvalidResponse(format!("failed to parse '{s}' as f64")))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        Err(ExchangeError::InvalidResponse(format!(
            "expected string or number, got: {val}"
        )))
    }
}

/// Parse a JSON value that may be either a string or an integer into `i64`.
pub fn parse_str_i64(val: &serde_json::Value) -> Result<i64, ExchangeError> {
    if let Some(s) = val.as_str() {
        s.parse::<i64>()
            .map_err(|_| ExchangeError::InvalidResponse(format!("failed to parse '{s}' as i64")))
    } else if let Some(n) = val.as_i64() {
        Ok(n)
    } else {
        Err(ExchangeError::InvalidResponse(format!(
            "expected string or integer, got: {val}"
        )))
    }
}

/// Current UNIX timestamp in milliseconds.
pub fn timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Split a unified `BASE/QUOTE` symbol. Symbols without a slash are returned
/// as the base with an empty quote.
pub fn split_symbol(symbol: &str) -> (&str, &str) {
    match symbol.split_once('/') {
        Some((base, quote)) => (base, quote),
        None => (symbol, ""),
    }
}

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

// ---------------------------------------------------------------------------
// Raw candle
// ---------------------------------------------------------------------------

/// One candle as returned by an exchange client, timestamp in epoch ms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Ohlcv {
    pub fn new(timestamp_ms: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp_ms,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Tabular form
// ---------------------------------------------------------------------------

/// A single row of an [`OhlcvFrame`] with the timestamp parsed to UTC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// OHLCV table for one (exchange, symbol, timeframe), oldest row first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvFrame {
    pub exchange: String,
    pub symbol: String,
    pub timeframe: String,
    pub rows: Vec<OhlcvRow>,
}

/// Aggregate view of an [`OhlcvFrame`], used for per-round poll logging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSummary {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

impl OhlcvFrame {
    pub const COLUMNS: [&'static str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

    /// Shape raw candles into a table, converting epoch-ms to calendar time.
    ///
    /// Fails only if a timestamp is outside chrono's representable range.
    pub fn from_candles(
        exchange: &str,
        symbol: &str,
        timeframe: &str,
        candles: &[Ohlcv],
    ) -> Result<Self, ExchangeError> {
        let mut rows = Vec::with_capacity(candles.len());
        for c in candles {
            let timestamp = Utc.timestamp_millis_opt(c.timestamp_ms).single().ok_or_else(|| {
                ExchangeError::InvalidResponse(format!("timestamp out of range: {}", c.timestamp_ms))
            })?;
            rows.push(OhlcvRow {
                timestamp,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            });
        }
        rows.sort_by_key(|r| r.timestamp);

        Ok(Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            rows,
        })
    }

    pub fn columns(&self) -> &'static [&'static str] {
        &Self::COLUMNS
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Span, open/close, extremes and total volume of the table. `None` for
    /// an empty frame.
    pub fn summary(&self) -> Option<FrameSummary> {
        if self.is_empty() {
            return None;
        }
        let timestamps = self.timestamps();

        Some(FrameSummary {
            first: *timestamps.first()?,
            last: *timestamps.last()?,
            open: *self.opens().first()?,
            close: *self.closes().last()?,
            high: self.highs().into_iter().fold(f64::NEG_INFINITY, f64::max),
            low: self.lows().into_iter().fold(f64::INFINITY, f64::min),
            volume: self.volumes().iter().sum(),
        })
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.volume).collect()
    }

    /// Most recent row, if any.
    pub fn last(&self) -> Option<&OhlcvRow> {
        self.rows.last()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_convert_from_millis() {
        let candles = [Ohlcv::new(1_700_000_000_000, 1.0, 2.0, 0.5, 1.5, 10.0)];
        let frame = OhlcvFrame::from_candles("binance", "BTC/USDT", "1m", &candles).unwrap();

        assert_eq!(frame.columns(), &["timestamp", "open", "high", "low", "close", "volume"]);
        assert_eq!(frame.len(), 1);
        assert_eq!(
            frame.rows[0].timestamp.to_rfc3339(),
            "2023-11-14T22:13:20+00:00"
        );
        assert_eq!(frame.closes(), vec![1.5]);
    }

    #[test]
    fn rows_are_ordered_oldest_first() {
        let candles = [
            Ohlcv::new(120_000, 3.0, 3.0, 3.0, 3.0, 1.0),
            Ohlcv::new(0, 1.0, 1.0, 1.0, 1.0, 1.0),
            Ohlcv::new(60_000, 2.0, 2.0, 2.0, 2.0, 1.0),
        ];
        let frame = OhlcvFrame::from_candles("coinbase", "BTC/USD", "1m", &candles).unwrap();
        assert_eq!(frame.opens(), vec![1.0, 2.0, 3.0]);
        assert_eq!(frame.last().map(|r| r.close), Some(3.0));
    }

    #[test]
    fn summary_aggregates_all_rows() {
        let candles = [
            Ohlcv::new(60_000, 2.0, 5.0, 1.5, 4.0, 20.0),
            Ohlcv::new(0, 1.0, 3.0, 0.5, 2.0, 10.0),
            Ohlcv::new(120_000, 4.0, 4.5, 3.5, 3.8, 5.0),
        ];
        let frame = OhlcvFrame::from_candles("binance", "BTC/USDT", "1m", &candles).unwrap();
        let s = frame.summary().unwrap();

        assert_eq!(s.first, frame.timestamps()[0]);
        assert_eq!(s.last.timestamp_millis(), 120_000);
        assert_eq!(s.open, 1.0);
        assert_eq!(s.close, 3.8);
        assert_eq!(s.high, 5.0);
        assert_eq!(s.low, 0.5);
        assert!((s.volume - 35.0).abs() < 1e-9);
    }

    #[test]
    fn empty_frame_has_no_summary() {
        let frame = OhlcvFrame::from_candles("binance", "BTC/USDT", "1m", &[]).unwrap();
        assert!(frame.is_empty());
        assert!(frame.summary().is_none());
    }

    #[test]
    fn out_of_range_timestamp_is_rejected() {
        let candles = [Ohlcv::new(i64::MAX, 1.0, 1.0, 1.0, 1.0, 1.0)];
        let err = OhlcvFrame::from_candles("binance", "BTC/USDT", "1m", &candles).unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidResponse(_)));
    }

    #[test]
    fn frame_serialises_rows_as_records() {
        let candles = [Ohlcv::new(0, 1.0, 2.0, 0.5, 1.5, 10.0)];
        let frame = OhlcvFrame::from_candles("binance", "BTC/USDT", "1m", &candles).unwrap();
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["rows"][0]["timestamp"], "1970-01-01T00:00:00Z");
        assert_eq!(json["rows"][0]["volume"], 10.0);
    }
}

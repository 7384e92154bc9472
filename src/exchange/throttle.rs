// =============================================================================
// Rate limiting — per-exchange request spacing and venue usage tracking
// =============================================================================
//
// `RequestThrottle` enforces a minimum interval between consecutive calls to
// one exchange. The last-call timestamp sits behind an async mutex that is held
// across the wait *and* the call, so concurrent callers queue up instead of
// racing on the bookkeeping.
//
// `UsedWeightTracker` mirrors Binance's `X-MBX-USED-WEIGHT-1M` header so the
// collector can warn before the venue starts answering 429.
// =============================================================================

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Binance request-weight budget per minute.
const WEIGHT_LIMIT_1M: u32 = 1200;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 800;

// -----------------------------------------------------------------------------
// RequestThrottle
// -----------------------------------------------------------------------------

/// Serialises calls to one exchange and spaces them by `min_interval`.
pub struct RequestThrottle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    /// `rate_limit` is in requests per second; zero disables spacing.
    pub fn new(rate_limit: u32) -> Self {
        let min_interval = if rate_limit == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(1_000_000_000 / u64::from(rate_limit))
        };
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait out the remainder of the interval, run `call`, and record the
    /// moment the call completed. The timestamp is recorded whether `call`
    /// succeeds or fails.
    pub async fn run<F, T>(&self, call: F) -> T
    where
        F: Future<Output = T>,
    {
        let mut last = self.last_call.lock().await;

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                debug!(wait_ms = wait.as_millis() as u64, "throttling request");
                tokio::time::sleep(wait).await;
            }
        }

        let out = call.await;
        *last = Some(Instant::now());
        out
    }

    /// Time of the most recent completed call, if any.
    #[cfg(test)]
    pub async fn last_call(&self) -> Option<Instant> {
        *self.last_call.lock().await
    }
}

impl std::fmt::Debug for RequestThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestThrottle")
            .field("min_interval", &self.min_interval)
            .finish()
    }
}

// -----------------------------------------------------------------------------
// UsedWeightTracker
// -----------------------------------------------------------------------------

/// Lock-free record of the most recently reported request weight.
pub struct UsedWeightTracker {
    used_weight_1m: AtomicU32,
}

impl UsedWeightTracker {
    pub fn new() -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
        }
    }

    /// Update from response headers. Warns once when crossing the threshold
    /// and again on every response while above it.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let Some(w) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };

        let prev = self.used_weight_1m.swap(w, Ordering::Relaxed);
        if w >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = w,
                limit = WEIGHT_LIMIT_1M,
                "request weight crossed warning threshold"
            );
        } else if w >= WEIGHT_WARN_THRESHOLD {
            warn!(used_weight = w, "request weight remains above warning threshold");
        }
        debug!(used_weight_1m = w, "request weight updated from header");
    }

    pub fn used_weight(&self) -> u32 {
        self.used_weight_1m.load(Ordering::Relaxed)
    }

    /// `true` once usage is at or above the warning threshold.
    #[cfg(test)]
    pub fn is_near_limit(&self) -> bool {
        self.used_weight() >= WEIGHT_WARN_THRESHOLD
    }
}

impl Default for UsedWeightTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UsedWeightTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsedWeightTracker")
            .field("used_weight_1m", &self.used_weight())
            .finish()
    }
}

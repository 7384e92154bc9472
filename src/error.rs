// =============================================================================
// Error taxonomy — configuration failures are fatal, exchange failures are not
// =============================================================================

use thiserror::Error;

/// Raised while building [`crate::config::Config`] from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Firebase configuration missing: FIREBASE_PROJECT_ID is required in production")]
    MissingFirebaseProject,

    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Failure kinds surfaced by an exchange client.
///
/// The collector logs `Authentication` and `Network` distinctly during
/// initialisation; everything else falls into the generic bucket.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unsupported exchange: {0}")]
    Unsupported(String),
}

impl ExchangeError {
    /// `true` for transport-level failures (including throttling by the venue).
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited(_))
    }
}

// =============================================================================
// Configuration — environment-driven settings loaded once at startup
// =============================================================================
//
// Every variable is optional and falls back to a documented default. The only
// hard requirement is a Firebase project id when ENVIRONMENT=production.
// Malformed numbers are rejected rather than silently defaulted.
// =============================================================================

use std::collections::BTreeMap;
use std::str::FromStr;

use tracing::{error, warn};

use crate::error::ConfigError;

const PRODUCTION: &str = "production";

// =============================================================================
// Default-value helpers
// =============================================================================

fn default_rate_limit() -> u32 {
    10
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_collection() -> String {
    "amin_market_data".to_string()
}

fn default_symbols() -> Vec<String> {
    vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()]
}

// =============================================================================
// ExchangeConfig
// =============================================================================

/// Credentials and client limits for a single exchange.
#[derive(Clone, PartialEq)]
pub struct ExchangeConfig {
    pub name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Requests per second; the collector spaces calls by `1 / rate_limit`.
    pub rate_limit: u32,
    /// Request timeout in seconds.
    pub timeout: u64,
}

impl ExchangeConfig {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            rate_limit: default_rate_limit(),
            timeout: default_timeout_secs(),
        }
    }

    /// Both halves of the credential pair are present.
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("name", &self.name)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("rate_limit", &self.rate_limit)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// =============================================================================
// Sink / processing / model settings
// =============================================================================

/// Descriptor for the downstream document store. Nothing in this crate writes
/// to it; the values are carried for collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct FirebaseConfig {
    pub project_id: String,
    pub credentials_path: String,
    pub collection_name: String,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            credentials_path: String::new(),
            collection_name: default_collection(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSettings {
    pub window_size: u32,
    /// Seconds between poll rounds.
    pub polling_interval: u64,
    pub symbols: Vec<String>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            window_size: 100,
            polling_interval: 60,
            symbols: default_symbols(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub prediction_horizon: u32,
    pub confidence_threshold: f64,
    /// Seconds.
    pub retrain_interval: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            prediction_horizon: 5,
            confidence_threshold: 0.7,
            retrain_interval: 3600,
        }
    }
}

// =============================================================================
// Config
// =============================================================================

/// Process-wide settings snapshot. Built once in `main` and handed to every
/// component by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub environment: String,
    pub exchanges: BTreeMap<String, ExchangeConfig>,
    pub firebase: FirebaseConfig,
    pub data: DataSettings,
    pub model: ModelSettings,
}

impl Config {
    /// Build from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source, then validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).unwrap_or_default();

        let mut exchanges = BTreeMap::new();
        for (name, key_var, secret_var) in [
            ("binance", "BINANCE_API_KEY", "BINANCE_API_SECRET"),
            ("coinbase", "COINBASE_API_KEY", "COINBASE_API_SECRET"),
        ] {
            exchanges.insert(
                name.to_string(),
                ExchangeConfig::new(name, var(key_var), var(secret_var)),
            );
        }

        let firebase = FirebaseConfig {
            project_id: var("FIREBASE_PROJECT_ID"),
            credentials_path: var("FIREBASE_CREDENTIALS_PATH"),
            collection_name: lookup("FIREBASE_COLLECTION").unwrap_or_else(default_collection),
        };

        let data = DataSettings {
            window_size: parse_var(&lookup, "WINDOW_SIZE", 100)?,
            polling_interval: parse_var(&lookup, "POLLING_INTERVAL", 60)?,
            symbols: lookup("SYMBOLS")
                .map(|raw| parse_symbols(&raw))
                .unwrap_or_else(default_symbols),
        };

        let model = ModelSettings {
            prediction_horizon: parse_var(&lookup, "PREDICTION_HORIZON", 5)?,
            confidence_threshold: parse_var(&lookup, "CONFIDENCE_THRESHOLD", 0.7)?,
            retrain_interval: parse_var(&lookup, "RETRAIN_INTERVAL", 3600)?,
        };

        let config = Self {
            log_level: lookup("LOG_LEVEL")
                .unwrap_or_else(|| "INFO".to_string())
                .to_uppercase(),
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            exchanges,
            firebase,
            data,
            model,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_production() {
            return Ok(());
        }

        let binance_key_missing = self
            .exchanges
            .get("binance")
            .map_or(true, |ex| ex.api_key.is_empty());
        if binance_key_missing {
            warn!("Binance API key not configured");
        }

        if self.firebase.project_id.is_empty() {
            error!("Firebase project ID required for production");
            return Err(ConfigError::MissingFirebaseProject);
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == PRODUCTION
    }

    /// Names of exchanges with both an API key and secret configured, in map
    /// order.
    pub fn get_active_exchanges(&self) -> Vec<String> {
        self.exchanges
            .iter()
            .filter(|(_, ex)| ex.has_credentials())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Directive for `tracing_subscriber::EnvFilter` derived from `LOG_LEVEL`.
    pub fn tracing_filter(&self) -> String {
        level_filter(&self.log_level)
    }
}

/// Map a `LOG_LEVEL` value to an `EnvFilter` directive.
///
/// Used directly by `main` so the subscriber exists before `Config` is built
/// and validation warnings are not lost.
pub fn level_filter(level: &str) -> String {
    match level.trim().to_uppercase().as_str() {
        // Python-style level names that have no tracing equivalent.
        "WARNING" => "warn".to_string(),
        "CRITICAL" | "FATAL" => "error".to_string(),
        "" => "info".to_string(),
        other => other.to_lowercase(),
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use parking_lot::Mutex;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.log_level, "INFO");
        assert_eq!(cfg.environment, "development");
        assert_eq!(cfg.firebase.collection_name, "amin_market_data");
        assert_eq!(cfg.data.window_size, 100);
        assert_eq!(cfg.data.polling_interval, 60);
        assert_eq!(cfg.data.symbols, vec!["BTC/USDT", "ETH/USDT"]);
        assert_eq!(cfg.model.prediction_horizon, 5);
        assert!((cfg.model.confidence_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(cfg.model.retrain_interval, 3600);

        let binance = &cfg.exchanges["binance"];
        assert_eq!(binance.rate_limit, 10);
        assert_eq!(binance.timeout, 30);
        assert!(cfg.exchanges.contains_key("coinbase"));
    }

    #[test]
    fn production_without_firebase_project_fails() {
        let err = load(&[("ENVIRONMENT", "production")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFirebaseProject));

        let err = load(&[
            ("ENVIRONMENT", "production"),
            ("BINANCE_API_KEY", "k"),
            ("BINANCE_API_SECRET", "s"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingFirebaseProject));
    }

    #[test]
    fn production_with_firebase_project_succeeds_without_keys() {
        let cfg = load(&[
            ("ENVIRONMENT", "production"),
            ("FIREBASE_PROJECT_ID", "amin-prod"),
        ])
        .unwrap();
        assert!(cfg.is_production());
        assert!(cfg.get_active_exchanges().is_empty());
    }

    #[test]
    fn development_tolerates_missing_firebase_project() {
        assert!(load(&[("ENVIRONMENT", "staging")]).is_ok());
    }

    #[test]
    fn active_exchanges_require_key_and_secret() {
        let cfg = load(&[
            ("BINANCE_API_KEY", "k"),
            ("BINANCE_API_SECRET", "s"),
            ("COINBASE_API_KEY", "only-key"),
        ])
        .unwrap();
        assert_eq!(cfg.get_active_exchanges(), vec!["binance"]);

        let cfg = load(&[
            ("BINANCE_API_SECRET", "s"),
            ("COINBASE_API_KEY", "k"),
            ("COINBASE_API_SECRET", "s"),
        ])
        .unwrap();
        assert_eq!(cfg.get_active_exchanges(), vec!["coinbase"]);

        let cfg = load(&[
            ("BINANCE_API_KEY", "k"),
            ("BINANCE_API_SECRET", "s"),
            ("COINBASE_API_KEY", "k"),
            ("COINBASE_API_SECRET", "s"),
        ])
        .unwrap();
        assert_eq!(cfg.get_active_exchanges(), vec!["binance", "coinbase"]);
    }

    #[test]
    fn symbols_are_split_and_trimmed() {
        let cfg = load(&[("SYMBOLS", " SOL/USDT, ,BTC/USD ,")]).unwrap();
        assert_eq!(cfg.data.symbols, vec!["SOL/USDT", "BTC/USD"]);
    }

    #[test]
    fn malformed_number_is_rejected() {
        let err = load(&[("POLLING_INTERVAL", "soon")]).unwrap_err();
        match err {
            ConfigError::InvalidValue { var, value } => {
                assert_eq!(var, "POLLING_INTERVAL");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn log_level_maps_to_tracing_filter() {
        let cfg = load(&[("LOG_LEVEL", "debug")]).unwrap();
        assert_eq!(cfg.log_level, "DEBUG");
        assert_eq!(cfg.tracing_filter(), "debug");

        let cfg = load(&[("LOG_LEVEL", "warning")]).unwrap();
        assert_eq!(cfg.tracing_filter(), "warn");

        assert_eq!(level_filter(" critical "), "error");
        assert_eq!(level_filter(""), "info");
    }

    /// `io::Write` sink shared with a test subscriber.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn load_logged(vars: &[(&str, &str)]) -> (Result<Config, ConfigError>, String) {
        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();

        let result = tracing::subscriber::with_default(subscriber, || load(vars));
        let logs = String::from_utf8_lossy(&capture.0.lock()).into_owned();
        (result, logs)
    }

    #[test]
    fn production_without_binance_key_logs_warning() {
        let (result, logs) = load_logged(&[
            ("ENVIRONMENT", "production"),
            ("FIREBASE_PROJECT_ID", "p"),
        ]);
        assert!(result.is_ok());
        assert!(logs.contains("WARN"), "logs: {logs}");
        assert!(logs.contains("Binance API key not configured"), "logs: {logs}");
    }

    #[test]
    fn production_without_firebase_project_logs_error() {
        let (result, logs) = load_logged(&[("ENVIRONMENT", "production")]);
        assert!(result.is_err());
        assert!(logs.contains("Firebase project ID required for production"), "logs: {logs}");
    }

    #[test]
    fn development_logs_no_validation_warning() {
        let (result, logs) = load_logged(&[]);
        assert!(result.is_ok());
        assert!(!logs.contains("Binance API key not configured"), "logs: {logs}");
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let ex = ExchangeConfig::new("binance", "my-key", "my-secret");
        let dbg = format!("{ex:?}");
        assert!(!dbg.contains("my-key"));
        assert!(!dbg.contains("my-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}

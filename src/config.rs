//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TollgateError};
use crate::ratelimit::{MAX_RATE, MAX_WINDOW};

/// Upper bound for every interval given in seconds.
const MAX_INTERVAL_SECS: u64 = MAX_WINDOW.as_secs();

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Which admission strategy guards the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// One token bucket shared by every client
    Global,
    /// One token bucket per client
    PerClient,
    /// Exact request count per client over a trailing window
    SlidingWindow,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Admission strategy
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,

    /// Sustained permits per second (token bucket strategies)
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Bucket capacity (token bucket strategies)
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Maximum requests per window (sliding window)
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Window length in seconds (sliding window)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Sweep interval override in seconds; the strategy default applies when unset
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,

    /// Advisory `Retry-After` value for token bucket denials
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,

    /// Identify clients by `X-Forwarded-For` / `X-Real-IP` when present
    #[serde(default)]
    pub trust_forwarded_headers: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            rate: default_rate(),
            burst: default_burst(),
            limit: default_limit(),
            window_secs: default_window_secs(),
            sweep_interval_secs: None,
            retry_after_secs: default_retry_after_secs(),
            trust_forwarded_headers: false,
        }
    }
}

fn default_strategy() -> Strategy {
    Strategy::PerClient
}

fn default_rate() -> f64 {
    5.0
}

fn default_burst() -> u32 {
    10
}

fn default_limit() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_retry_after_secs() -> u64 {
    1
}

impl RateLimitingConfig {
    /// Window length for the sliding window strategy.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Configured sweep interval override, if any.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }

    /// Reject values no limiter can enforce.
    pub fn validate(&self) -> Result<()> {
        match self.strategy {
            Strategy::Global | Strategy::PerClient => {
                if !self.rate.is_finite() || self.rate <= 0.0 || self.rate > MAX_RATE {
                    return Err(TollgateError::Config(format!(
                        "rate_limiting.rate must be positive and at most {}, got {}",
                        MAX_RATE, self.rate
                    )));
                }
                if self.burst == 0 {
                    return Err(TollgateError::Config(
                        "rate_limiting.burst must be at least 1".to_string(),
                    ));
                }
            }
            Strategy::SlidingWindow => {
                if self.limit == 0 {
                    return Err(TollgateError::Config(
                        "rate_limiting.limit must be at least 1".to_string(),
                    ));
                }
                if self.window_secs == 0 || self.window_secs > MAX_INTERVAL_SECS {
                    return Err(TollgateError::Config(format!(
                        "rate_limiting.window_secs must be between 1 and {}, got {}",
                        MAX_INTERVAL_SECS, self.window_secs
                    )));
                }
            }
        }

        if let Some(secs) = self.sweep_interval_secs {
            if secs == 0 || secs > MAX_INTERVAL_SECS {
                return Err(TollgateError::Config(format!(
                    "rate_limiting.sweep_interval_secs must be between 1 and {}, got {}",
                    MAX_INTERVAL_SECS, secs
                )));
            }
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level filter; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl TollgateConfig {
    /// Load configuration from an optional YAML file layered under
    /// `TOLLGATE__*` environment variables.
    ///
    /// `TOLLGATE__RATE_LIMITING__BURST=20` overrides `rate_limiting.burst`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TOLLGATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: TollgateConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TollgateConfig::default();

        assert_eq!(config.server.http_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.rate_limiting.strategy, Strategy::PerClient);
        assert_eq!(config.rate_limiting.rate, 5.0);
        assert_eq!(config.rate_limiting.burst, 10);
        assert_eq!(config.rate_limiting.window(), Duration::from_secs(60));
        assert_eq!(config.rate_limiting.sweep_interval(), None);
        assert_eq!(config.rate_limiting.retry_after_secs, 1);
        assert!(!config.rate_limiting.trust_forwarded_headers);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_sliding_window_config() {
        let yaml = r#"
server:
  http_addr: 127.0.0.1:9000
rate_limiting:
  strategy: sliding_window
  limit: 100
  window_secs: 60
  sweep_interval_secs: 30
  trust_forwarded_headers: true
logging:
  level: debug
  format: json
"#;

        let config = TollgateConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.rate_limiting.strategy, Strategy::SlidingWindow);
        assert_eq!(config.rate_limiting.limit, 100);
        assert_eq!(
            config.rate_limiting.sweep_interval(),
            Some(Duration::from_secs(30))
        );
        assert!(config.rate_limiting.trust_forwarded_headers);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
rate_limiting:
  rate: 2.5
"#;

        let config = TollgateConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.rate_limiting.rate, 2.5);
        assert_eq!(config.rate_limiting.burst, 10);
        assert_eq!(config.server.http_addr, default_http_addr());
    }

    #[test]
    fn test_invalid_token_bucket_config() {
        let zero_rate = "rate_limiting:\n  strategy: per_client\n  rate: 0\n";
        assert!(TollgateConfig::from_yaml(zero_rate).is_err());

        let zero_burst = "rate_limiting:\n  strategy: global\n  burst: 0\n";
        assert!(TollgateConfig::from_yaml(zero_burst).is_err());
    }

    #[test]
    fn test_invalid_window_config() {
        let zero_limit = "rate_limiting:\n  strategy: sliding_window\n  limit: 0\n";
        assert!(TollgateConfig::from_yaml(zero_limit).is_err());

        let zero_window = "rate_limiting:\n  strategy: sliding_window\n  window_secs: 0\n";
        assert!(TollgateConfig::from_yaml(zero_window).is_err());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let yaml = "rate_limiting:\n  sweep_interval_secs: 0\n";
        assert!(TollgateConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_oversized_values_rejected() {
        let huge_sweep = format!("rate_limiting:\n  sweep_interval_secs: {}\n", u64::MAX);
        assert!(matches!(
            TollgateConfig::from_yaml(&huge_sweep),
            Err(TollgateError::Config(_))
        ));

        let huge_window = format!(
            "rate_limiting:\n  strategy: sliding_window\n  window_secs: {}\n",
            u64::MAX - 1
        );
        assert!(matches!(
            TollgateConfig::from_yaml(&huge_window),
            Err(TollgateError::Config(_))
        ));

        let huge_rate = "rate_limiting:\n  rate: 1.0e20\n";
        assert!(matches!(
            TollgateConfig::from_yaml(huge_rate),
            Err(TollgateError::Config(_))
        ));

        let longest = format!(
            "rate_limiting:\n  strategy: sliding_window\n  window_secs: {}\n  sweep_interval_secs: {}\n",
            MAX_INTERVAL_SECS, MAX_INTERVAL_SECS
        );
        assert!(TollgateConfig::from_yaml(&longest).is_ok());
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let yaml = "rate_limiting:\n  strategy: leaky_bucket\n";
        assert!(matches!(
            TollgateConfig::from_yaml(yaml),
            Err(TollgateError::Config(_))
        ));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = TollgateConfig::load(None).unwrap();
        assert_eq!(config.rate_limiting.retry_after_secs, 1);
    }

    #[test]
    fn test_load_reads_yaml_file() {
        let path = std::env::temp_dir().join(format!("tollgate-{}.yaml", std::process::id()));
        std::fs::write(
            &path,
            "rate_limiting:\n  strategy: global\n  rate: 3\n  burst: 4\n",
        )
        .unwrap();

        let loaded = TollgateConfig::load(Some(&path));
        std::fs::remove_file(&path).unwrap();

        let config = loaded.unwrap();
        assert_eq!(config.rate_limiting.strategy, Strategy::Global);
        assert_eq!(config.rate_limiting.rate, 3.0);
        assert_eq!(config.rate_limiting.burst, 4);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let path = std::env::temp_dir().join("tollgate-does-not-exist.yaml");
        assert!(matches!(
            TollgateConfig::load(Some(&path)),
            Err(TollgateError::ConfigSource(_))
        ));
    }
}

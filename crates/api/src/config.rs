//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::{DomainError, FeePolicy, Money};
use purchase::PurchaseConfig;
use rust_decimal::Decimal;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`: PostgreSQL; unset runs in memory
/// - `JWT_SECRET`: HS256 secret for bearer tokens
/// - `PLATFORM_FEE_RATE`, `DISBURSEMENT_FEE`: fee policy
/// - `PAYMENT_WINDOW_SECS`, `GATEWAY_TIMEOUT_SECS`: purchase timing
/// - `GATEWAY_BASE_URL`, `GATEWAY_SECRET_KEY`: invoice API; unset uses a fake
/// - `SWEEP_INTERVAL_SECS`, `SWEEP_BATCH_SIZE`: expiry sweeper
///
/// Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub platform_fee_rate: Decimal,
    pub disbursement_fee: Decimal,
    pub payment_window_secs: u64,
    pub gateway_timeout_secs: u64,
    pub gateway_base_url: Option<String>,
    pub gateway_secret_key: Option<String>,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref().map(str::trim) {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: present("DATABASE_URL"),
            database_max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
            jwt_secret: present("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            platform_fee_rate: parse_or(&lookup, "PLATFORM_FEE_RATE", defaults.platform_fee_rate),
            disbursement_fee: parse_or(&lookup, "DISBURSEMENT_FEE", defaults.disbursement_fee),
            payment_window_secs: parse_or(
                &lookup,
                "PAYMENT_WINDOW_SECS",
                defaults.payment_window_secs,
            ),
            gateway_timeout_secs: parse_or(
                &lookup,
                "GATEWAY_TIMEOUT_SECS",
                defaults.gateway_timeout_secs,
            ),
            gateway_base_url: present("GATEWAY_BASE_URL"),
            gateway_secret_key: present("GATEWAY_SECRET_KEY"),
            sweep_interval_secs: parse_or(
                &lookup,
                "SWEEP_INTERVAL_SECS",
                defaults.sweep_interval_secs,
            ),
            sweep_batch_size: parse_or(&lookup, "SWEEP_BATCH_SIZE", defaults.sweep_batch_size),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the fee policy, rejecting a negative rate or fee.
    pub fn fee_policy(&self) -> Result<FeePolicy, DomainError> {
        FeePolicy::new(self.platform_fee_rate, Money::new(self.disbursement_fee))
    }

    /// Builds the purchase workflow settings.
    pub fn purchase_config(&self) -> Result<PurchaseConfig, DomainError> {
        Ok(PurchaseConfig {
            fee_policy: self.fee_policy()?,
            gateway_timeout: Duration::from_secs(self.gateway_timeout_secs),
            payment_window: self.payment_window(),
        })
    }

    pub fn payment_window(&self) -> chrono::Duration {
        let secs = i64::try_from(self.payment_window_secs).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(secs).unwrap_or(chrono::Duration::MAX)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Returns the invoice API base URL and secret key when both are set.
    pub fn gateway_credentials(&self) -> Option<(&str, &str)> {
        match (&self.gateway_base_url, &self.gateway_secret_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            jwt_secret: "dev-secret-change-me".to_string(),
            platform_fee_rate: Decimal::new(5, 2),
            disbursement_fee: Decimal::from(2000),
            payment_window_secs: 3600,
            gateway_timeout_secs: 10,
            gateway_base_url: None,
            gateway_secret_key: None,
            sweep_interval_secs: 60,
            sweep_batch_size: 100,
        }
    }
}

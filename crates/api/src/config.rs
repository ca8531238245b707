//! API configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKETPLACE_SIGNING_SECRET` - HMAC key for checkout response signatures
//!   (min 32 chars, high entropy)
//! - `MARKETPLACE_DATABASE_URL` (or `DATABASE_URL`) - `PostgreSQL` connection
//!   string, required when `MARKETPLACE_STORAGE=postgres`
//!
//! ## Optional
//! - `MARKETPLACE_STORAGE` - `postgres` (default) or `memory`
//! - `MARKETPLACE_HOST` - Bind address (default: 127.0.0.1)
//! - `MARKETPLACE_PORT` - Listen port (default: 3000)
//! - `MARKETPLACE_BASE_URL` - Public URL (default: <http://localhost:3000>)
//! - `MARKETPLACE_CURRENCY` - Order currency (default: INR)
//! - `PLATFORM_FEE_RATE` - Platform fee as a fraction of subtotal (default: 0.017)
//! - `PLATFORM_FEE_OFFSET` - Flat amount added to the fee (default: 0)
//! - `IDEMPOTENCY_TTL_SECS` - Cached checkout lifetime (default: 300)
//! - `IDEMPOTENCY_SWEEP_SECS` - Expired entry sweep interval (default: 60)
//! - `CHECKOUT_TIMEOUT_SECS` - Checkout wall-clock budget (default: 10)
//! - `CHECKOUT_RATE_LIMIT_BURST` - Checkout requests per caller per window (default: 7)
//! - `CHECKOUT_RATE_LIMIT_PERIOD_SECS` - Seconds to replenish one request (default: 9)
//! - `LOG_FORMAT` - `pretty` (default) or `json`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use marketplace_core::CurrencyCode;
use marketplace_core::pricing::{PricingConfig, PricingEngine};

const MIN_SIGNING_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Where orders, carts and idempotency records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local storage. Single instance only; used for tests and demos.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend: {other}")),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Idempotency cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdempotencyConfig {
    /// How long a cached checkout response can be replayed.
    pub ttl: Duration,
    /// How often expired entries are swept.
    pub sweep_interval: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Checkout budget and rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutConfig {
    /// Wall-clock budget for one checkout.
    pub timeout: Duration,
    /// Requests a caller may make in a burst.
    pub rate_limit_burst: u32,
    /// Time to replenish one request.
    pub rate_limit_period: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            rate_limit_burst: 7,
            rate_limit_period: Duration::from_secs(9),
        }
    }
}

/// Marketplace API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Storage backend
    pub storage: StorageBackend,
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// HMAC key for the `X-Signature` header
    pub signing_secret: SecretString,
    /// Platform fee parameters
    pub pricing: PricingConfig,
    /// Currency recorded on new orders
    pub currency: CurrencyCode,
    /// Idempotency cache tuning
    pub idempotency: IdempotencyConfig,
    /// Checkout budget and rate limit
    pub checkout: CheckoutConfig,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry performance trace sample rate
    pub sentry_traces_sample_rate: f32,
}

impl ApiConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let storage: StorageBackend = parse_env_or_default("MARKETPLACE_STORAGE", "postgres")?;
        let database_url = match storage {
            StorageBackend::Postgres => Some(get_database_url("MARKETPLACE_DATABASE_URL")?),
            StorageBackend::Memory => get_database_url("MARKETPLACE_DATABASE_URL").ok(),
        };
        let host = parse_env_or_default("MARKETPLACE_HOST", "127.0.0.1")?;
        let port = parse_env_or_default("MARKETPLACE_PORT", "3000")?;
        let base_url = get_env_or_default("MARKETPLACE_BASE_URL", "http://localhost:3000");

        let signing_secret = get_validated_secret("MARKETPLACE_SIGNING_SECRET")?;
        validate_secret_length(&signing_secret, "MARKETPLACE_SIGNING_SECRET")?;

        let pricing = PricingConfig {
            fee_rate: parse_env_or_default::<Decimal>("PLATFORM_FEE_RATE", "0.017")?,
            fee_offset: parse_env_or_default::<Decimal>("PLATFORM_FEE_OFFSET", "0")?,
        };
        PricingEngine::new(pricing)
            .map_err(|e| ConfigError::InvalidEnvVar("PLATFORM_FEE_RATE".to_string(), e.to_string()))?;

        let currency = parse_env_or_default("MARKETPLACE_CURRENCY", "INR")?;

        let idempotency = IdempotencyConfig {
            ttl: parse_secs("IDEMPOTENCY_TTL_SECS", 300)?,
            sweep_interval: parse_secs("IDEMPOTENCY_SWEEP_SECS", 60)?,
        };
        let checkout = CheckoutConfig {
            timeout: parse_secs("CHECKOUT_TIMEOUT_SECS", 10)?,
            rate_limit_burst: parse_positive("CHECKOUT_RATE_LIMIT_BURST", 7)?,
            rate_limit_period: parse_secs("CHECKOUT_RATE_LIMIT_PERIOD_SECS", 9)?,
        };

        Ok(Self {
            storage,
            database_url,
            host,
            port,
            base_url,
            signing_secret,
            pricing,
            currency,
            idempotency,
            checkout,
            log_format: parse_env_or_default("LOG_FORMAT", "pretty")?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.1")?,
        })
    }

    /// Configuration for an in-memory instance with default tuning.
    ///
    /// The secret is used as given; callers are responsible for its strength.
    #[must_use]
    pub fn in_memory(signing_secret: SecretString) -> Self {
        Self {
            storage: StorageBackend::Memory,
            database_url: None,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            signing_secret,
            pricing: PricingConfig::default(),
            currency: CurrencyCode::default(),
            idempotency: IdempotencyConfig::default(),
            checkout: CheckoutConfig::default(),
            log_format: LogFormat::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should be marked `Secure`.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a strictly positive integer.
fn parse_positive(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value: u32 = parse_env_or_default(key, &default.to_string())?;
    if value == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

/// Parse a strictly positive number of seconds.
fn parse_secs(key: &str, default: u32) -> Result<Duration, ConfigError> {
    parse_positive(key, default).map(|secs| Duration::from_secs(u64::from(secs)))
}

/// Validate that a secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SIGNING_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SIGNING_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

//! Sync service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SYNC_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `PROVIDER_BASE_URL` - Base URL of the delivery provider's merchant API
//! - `SYNC_API_TOKEN` - Bearer token the platform front-end presents (min 32 chars, high entropy)
//!
//! ## Optional
//! - `SYNC_HOST` - Bind address (default: 127.0.0.1)
//! - `SYNC_PORT` - Listen port (default: 3002)
//! - `PROVIDER_NAME` - Provider name stored on orders and credentials (default: default)
//! - `PROVIDER_TIMEOUT_SECS` - Provider request timeout (default: 30)
//! - `SYNC_INTERVAL_SECS` - Periodic sync interval (default: 600)
//! - `SYNC_COUNTDOWN_SECS` - Visible countdown before a sweep starts (default: 10)
//! - `SYNC_PERIODIC_ENABLED` - Whether new sessions start with the periodic timer on (default: true)
//! - `DELETION_GRACE_SECS` - Minimum order age before auto-deletion (default: 600)
//! - `DELETION_SETTLE_MS` - Delay before the final pre-deletion lookup (default: 2000)
//! - `DELETION_RETRIES` - Extra pre-deletion lookups, at least 1 (default: 1)
//! - `NOTIFY_MIN_INTERVAL_SECS` - Minimum gap between notifications per tracking key (default: 300)
//! - `STATUS_CATALOG_TTL_SECS` - Provider status list refresh interval (default: 3600)
//! - `REFERENCE_CACHE_TTL_SECS` - Cities/regions cache lifetime (default: 1800)
//! - `SYNC_LOG_JSON` - Emit JSON logs when set
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_API_TOKEN_LENGTH: usize = 32;
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

/// Sync service configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Bearer token required on every API request
    pub api_token: SecretString,
    /// Delivery provider configuration
    pub provider: ProviderConfig,
    /// Engine tuning shared by every session
    pub engine: EngineSettings,
    /// Whether new sessions start with the periodic timer enabled
    pub periodic_enabled: bool,
    /// Cities/regions cache lifetime
    pub reference_cache_ttl: Duration,
    /// Emit JSON logs
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Delivery provider API configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider name as stored on orders and credentials
    pub name: String,
    /// Base URL of the merchant API
    pub base_url: url::Url,
    /// Request timeout
    pub timeout: Duration,
}

/// Tuning values for the reconciliation engine.
///
/// Kept separate from [`SyncConfig`] so tests and the CLI can build an
/// engine without touching the environment.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Provider this engine reconciles against
    pub provider_name: String,
    /// Periodic sync interval
    pub sync_interval: Duration,
    /// Visible countdown before a triggered sweep starts
    pub countdown: Duration,
    /// Minimum order age before an unmatched order may be deleted
    pub deletion_grace: chrono::Duration,
    /// Delay before the final pre-deletion lookup
    pub deletion_settle: Duration,
    /// Extra pre-deletion lookups after the first (never below 1)
    pub deletion_retries: u32,
    /// Minimum gap between status notifications for one tracking key
    pub notify_min_interval: Duration,
    /// Provider status list refresh interval
    pub status_catalog_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            provider_name: "default".to_string(),
            sync_interval: Duration::from_secs(600),
            countdown: Duration::from_secs(10),
            deletion_grace: chrono::Duration::minutes(10),
            deletion_settle: Duration::from_secs(2),
            deletion_retries: 1,
            notify_min_interval: Duration::from_secs(300),
            status_catalog_ttl: Duration::from_secs(3600),
        }
    }
}

impl SyncConfig {
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

        let database_url = get_database_url("SYNC_DATABASE_URL")?;
        let host: IpAddr = parse_env_or_default("SYNC_HOST", "127.0.0.1")?;
        let port: u16 = parse_env_or_default("SYNC_PORT", "3002")?;
        let api_token = get_validated_secret("SYNC_API_TOKEN")?;
        validate_token_length(&api_token, "SYNC_API_TOKEN")?;

        let provider = ProviderConfig::from_env()?;
        let engine = EngineSettings::from_env(&provider.name)?;
        let periodic_enabled = parse_bool_env("SYNC_PERIODIC_ENABLED", true)?;
        let reference_cache_ttl =
            Duration::from_secs(parse_env_or_default("REFERENCE_CACHE_TTL_SECS", "1800")?);
        let log_json = get_optional_env("SYNC_LOG_JSON").is_some();

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            database_url,
            host,
            port,
            api_token,
            provider,
            engine,
            periodic_enabled,
            reference_cache_ttl,
            log_json,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Configuration for operator commands, which talk to the database and the
/// provider directly and need no API token.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// `PostgreSQL` connection URL
    pub database_url: SecretString,
    /// Provider API
    pub provider: ProviderConfig,
    /// Engine tuning
    pub engine: EngineSettings,
}

impl OperatorConfig {
    /// Load operator configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the database or provider variables are
    /// missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("SYNC_DATABASE_URL")?;
        let provider = ProviderConfig::from_env()?;
        let engine = EngineSettings::from_env(&provider.name)?;

        Ok(Self {
            database_url,
            provider,
            engine,
        })
    }
}

/// Load only the database URL (`SYNC_DATABASE_URL`, falling back to
/// `DATABASE_URL`).
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` if neither is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    let _ = dotenvy::dotenv();
    get_database_url("SYNC_DATABASE_URL")
}

impl ProviderConfig {
    /// Load provider configuration from environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the base URL is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = get_required_env("PROVIDER_BASE_URL")?;
        let base_url = url::Url::parse(&raw_url).map_err(|e| {
            ConfigError::InvalidEnvVar("PROVIDER_BASE_URL".to_string(), e.to_string())
        })?;

        Ok(Self {
            name: get_env_or_default("PROVIDER_NAME", "default"),
            base_url,
            timeout: Duration::from_secs(parse_env_or_default("PROVIDER_TIMEOUT_SECS", "30")?),
        })
    }
}

impl EngineSettings {
    fn from_env(provider_name: &str) -> Result<Self, ConfigError> {
        let grace_secs: i64 = parse_env_or_default("DELETION_GRACE_SECS", "600")?;
        if grace_secs < 0 {
            return Err(ConfigError::InvalidEnvVar(
                "DELETION_GRACE_SECS".to_string(),
                "must not be negative".to_string(),
            ));
        }
        let retries: u32 = parse_env_or_default("DELETION_RETRIES", "1")?;

        Ok(Self {
            provider_name: provider_name.to_string(),
            sync_interval: Duration::from_secs(parse_env_or_default("SYNC_INTERVAL_SECS", "600")?),
            countdown: Duration::from_secs(parse_env_or_default("SYNC_COUNTDOWN_SECS", "10")?),
            deletion_grace: chrono::Duration::seconds(grace_secs),
            deletion_settle: Duration::from_millis(parse_env_or_default(
                "DELETION_SETTLE_MS",
                "2000",
            )?),
            deletion_retries: retries.max(1),
            notify_min_interval: Duration::from_secs(parse_env_or_default(
                "NOTIFY_MIN_INTERVAL_SECS",
                "300",
            )?),
            status_catalog_ttl: Duration::from_secs(parse_env_or_default(
                "STATUS_CATALOG_TTL_SECS",
                "3600",
            )?),
        })
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
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to a default literal.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a boolean flag (`true/false/1/0/yes/no/on/off`).
fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| {
        parse_bool(&raw).ok_or_else(|| {
            ConfigError::InvalidEnvVar(key.to_string(), format!("not a boolean: {raw}"))
        })
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Validate that an API token meets minimum length requirements.
fn validate_token_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_API_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_API_TOKEN_LENGTH,
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

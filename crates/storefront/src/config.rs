//! Checkout configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string for the fallback order store
//!   (falls back to `DATABASE_URL`)
//! - `PAYMENT_PUBLIC_KEY` - Payment provider publishable key handed to the widget
//!
//! ## Optional
//! - `APP_ENV` - `production` or `development` (default: development)
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `CHECKOUT_API_BASE_URL` - Base URL of the checkout API (default: same origin)
//! - `CHECKOUT_API_TOKEN` - Bearer token for the checkout API
//! - `CHECKOUT_AUTHORIZE_PATH` - Authorization endpoint (default: /api/create-payment-intent)
//! - `CHECKOUT_ORDER_PATH` - Order write endpoint (default: /api/orders)
//! - `CHECKOUT_CURRENCY` - ISO 4217 code (default: EUR)
//! - `CHECKOUT_DEBOUNCE_MS` - Field validation debounce (default: 500)
//! - `CHECKOUT_SESSION_IDLE_MINUTES` - Idle session expiry (default: 30)
//! - `ORDER_RETRY_ATTEMPTS` - Primary order write attempts (default: 3)
//! - `ORDER_RETRY_DELAY_MS` - Delay between attempts (default: 1000)
//! - `ORDER_TIMEOUT_SECS` - Order write timeout (default: 30)
//! - `ORDER_PROBE_TIMEOUT_SECS` - Order endpoint probe timeout (default: 10)
//! - `AUTHORIZE_TIMEOUT_SECS` - Authorization timeout (default: 30)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use atelier_core::CurrencyCode;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Deployment environment.
///
/// Controls how much error detail reaches logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "local" | "test" => Ok(Self::Development),
            _ => Err(format!("expected production or development, got {s}")),
        }
    }
}

/// Checkout service configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    pub environment: Environment,
    /// Remote checkout API
    pub api: ApiConfig,
    /// Payment provider settings
    pub payment: PaymentConfig,
    /// Primary order write retry policy
    pub retry: RetryPolicy,
    /// Debounce window for field validation
    pub debounce: Duration,
    /// Sessions untouched for this long are torn down
    pub session_idle: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

/// Remote checkout API endpoints and timeouts.
///
/// Implements `Debug` manually to redact the bearer token.
#[derive(Clone)]
pub struct ApiConfig {
    pub base_url: Url,
    pub token: Option<SecretString>,
    pub authorize_path: String,
    pub order_path: String,
    pub authorize_timeout: Duration,
    pub order_timeout: Duration,
    pub probe_timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("authorize_path", &self.authorize_path)
            .field("order_path", &self.order_path)
            .field("authorize_timeout", &self.authorize_timeout)
            .field("order_timeout", &self.order_timeout)
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

/// Payment provider configuration.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Publishable key (safe to expose in browser)
    pub public_key: String,
    pub currency: CurrencyCode,
}

/// Fixed-delay retry policy for the primary order write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let database_url = env.database_url("STOREFRONT_DATABASE_URL")?;
        let host: IpAddr = env.parsed_or("STOREFRONT_HOST", "127.0.0.1")?;
        let port: u16 = env.parsed_or("STOREFRONT_PORT", "3000")?;
        let environment: Environment = env.parsed_or("APP_ENV", "development")?;

        let same_origin = format!("http://{host}:{port}");
        let base_url = env
            .or_default("CHECKOUT_API_BASE_URL", &same_origin)
            .parse::<Url>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("CHECKOUT_API_BASE_URL".to_string(), e.to_string())
            })?;

        let api = ApiConfig {
            base_url,
            token: env.optional("CHECKOUT_API_TOKEN").map(SecretString::from),
            authorize_path: env.or_default("CHECKOUT_AUTHORIZE_PATH", "/api/create-payment-intent"),
            order_path: env.or_default("CHECKOUT_ORDER_PATH", "/api/orders"),
            authorize_timeout: Duration::from_secs(env.parsed_or("AUTHORIZE_TIMEOUT_SECS", "30")?),
            order_timeout: Duration::from_secs(env.parsed_or("ORDER_TIMEOUT_SECS", "30")?),
            probe_timeout: Duration::from_secs(env.parsed_or("ORDER_PROBE_TIMEOUT_SECS", "10")?),
        };

        let payment = PaymentConfig {
            public_key: env.required("PAYMENT_PUBLIC_KEY")?,
            currency: env.parsed_or("CHECKOUT_CURRENCY", "EUR")?,
        };

        let max_attempts: u32 = env.parsed_or("ORDER_RETRY_ATTEMPTS", "3")?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "ORDER_RETRY_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let retry = RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(env.parsed_or("ORDER_RETRY_DELAY_MS", "1000")?),
        };

        let debounce = Duration::from_millis(env.parsed_or("CHECKOUT_DEBOUNCE_MS", "500")?);
        let idle_minutes: u64 = env.parsed_or("CHECKOUT_SESSION_IDLE_MINUTES", "30")?;

        Ok(Self {
            database_url,
            host,
            port,
            environment,
            api,
            payment,
            retry,
            debounce,
            session_idle: Duration::from_secs(idle_minutes * 60),
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Get an optional variable. Empty values count as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a variable with a default value.
    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// Get and parse a variable with a default value.
    fn parsed_or<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }

    /// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
    fn database_url(&self, primary_key: &str) -> Result<SecretString, ConfigError> {
        self.optional(primary_key)
            .or_else(|| self.optional("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(primary_key.to_string()))
    }
}

//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront (`https://` enables secure cookies)
//! - `STRIPE_SECRET_KEY` - Stripe API key (when `PAYMENT_PROVIDER=stripe`)
//! - `STRIPE_WEBHOOK_SECRET` - Stripe webhook signing secret (when `PAYMENT_PROVIDER=stripe`)
//!
//! ## Optional
//! - `STOREFRONT_DATABASE_URL` / `DATABASE_URL` - `PostgreSQL` connection string.
//!   Without it the service runs on in-process stores (single instance only).
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `PAYMENT_PROVIDER` - `stripe` (default) or `simulated`
//! - `STRIPE_API_BASE` - Stripe API base URL (default: <https://api.stripe.com>)
//! - `PAYMENT_TIMEOUT_SECS` - Payment provider request timeout (default: 15)
//! - `WEBHOOK_TOLERANCE_SECS` - Accepted webhook timestamp skew (default: 300)
//! - `CHECKOUT_CURRENCY` - ISO currency code (default: USD)
//! - `SHIPPING_COUNTRIES` - Comma-separated ISO country codes (default: US)
//! - `RATE_LIMIT_<CLASS>` - `<max>/<window_secs>` per route class
//!   (`LOGIN`, `CHECKOUT`, `ADMIN_MUTATION`, `CUSTOM_ORDER_SUBMISSION`, `DEFAULT`)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` -
//!   SMTP delivery; notifications are logged when `SMTP_HOST` is unset
//! - `ADMIN_NOTIFY_EMAIL` - Address for new-order alerts
//! - `NOTIFY_TIMEOUT_SECS` - Per-notification delivery timeout (default: 10)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`,
//!   `SENTRY_TRACES_SAMPLE_RATE` - Sentry error tracking

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use atelier_core::CurrencyCode;
use secrecy::SecretString;
use thiserror::Error;

use crate::services::rate_limit::{RatePolicies, RatePolicy, RouteClass};

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
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

/// Which payment provider creates checkout sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentProviderKind {
    /// Stripe Checkout, confirmed by signed webhooks.
    Stripe,
    /// Local provider that settles immediately (manual/testing path).
    Simulated,
}

impl FromStr for PaymentProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "simulated" => Ok(Self::Simulated),
            other => Err(format!("unknown payment provider '{other}'")),
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: Option<SecretString>,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Payment provider configuration
    pub payment: PaymentConfig,
    /// Per route-class rate limit policies
    pub rate_limits: RatePolicies,
    /// Notification delivery configuration
    pub notifications: NotificationConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Payment provider configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct PaymentConfig {
    pub provider: PaymentProviderKind,
    /// Stripe API secret key
    pub stripe_secret_key: Option<SecretString>,
    /// Shared secret for webhook signatures
    pub webhook_secret: Option<SecretString>,
    /// Stripe API base URL
    pub api_base: String,
    /// Timeout for provider API calls
    pub timeout: Duration,
    /// Maximum accepted age of a signed webhook
    pub webhook_tolerance: Duration,
    /// Currency for cart checkouts
    pub currency: CurrencyCode,
    /// Countries the provider collects shipping addresses for
    pub shipping_countries: Vec<String>,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("provider", &self.provider)
            .field("stripe_secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("currency", &self.currency)
            .field("shipping_countries", &self.shipping_countries)
            .finish()
    }
}

/// Notification delivery configuration.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    /// SMTP settings; `None` logs notifications instead of sending them
    pub smtp: Option<SmtpConfig>,
    /// Recipient of new-order alerts
    pub admin_email: Option<String>,
    /// Per-delivery timeout
    pub timeout: Duration,
}

/// SMTP relay configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl StorefrontConfig {
    /// Configuration with defaults for everything but the base URL.
    ///
    /// Uses in-process stores, the simulated payment provider and logged
    /// notifications. `from_env` starts from the same defaults.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            database_url: None,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: base_url.into(),
            payment: PaymentConfig {
                provider: PaymentProviderKind::Simulated,
                stripe_secret_key: None,
                webhook_secret: None,
                api_base: "https://api.stripe.com".to_owned(),
                timeout: Duration::from_secs(15),
                webhook_tolerance: Duration::from_secs(300),
                currency: CurrencyCode::USD,
                shipping_countries: vec!["US".to_owned()],
            },
            rate_limits: RatePolicies::default(),
            notifications: NotificationConfig {
                smtp: None,
                admin_email: None,
                timeout: Duration::from_secs(10),
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
        }
    }

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

        let mut config = Self::new(get_required_env("STOREFRONT_BASE_URL")?);
        config.database_url = get_database_url("STOREFRONT_DATABASE_URL");
        config.host = parse_env_or_default("STOREFRONT_HOST", config.host)?;
        config.port = parse_env_or_default("STOREFRONT_PORT", config.port)?;
        config.payment = PaymentConfig::from_env(config.payment)?;
        config.rate_limits = rate_policies_from_env()?;
        config.notifications = NotificationConfig::from_env(config.notifications)?;
        config.sentry_dsn = get_optional_env("SENTRY_DSN");
        config.sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        config.sentry_sample_rate =
            parse_env_or_default("SENTRY_SAMPLE_RATE", config.sentry_sample_rate)?;
        config.sentry_traces_sample_rate =
            parse_env_or_default("SENTRY_TRACES_SAMPLE_RATE", config.sentry_traces_sample_rate)?;

        Ok(config)
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies must carry the `Secure` attribute.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Absolute URL for a path on this storefront.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

impl PaymentConfig {
    fn from_env(defaults: Self) -> Result<Self, ConfigError> {
        let provider = parse_env_or_default("PAYMENT_PROVIDER", PaymentProviderKind::Stripe)?;
        let (stripe_secret_key, webhook_secret) = match provider {
            PaymentProviderKind::Stripe => (
                Some(get_validated_secret("STRIPE_SECRET_KEY")?),
                Some(get_validated_secret("STRIPE_WEBHOOK_SECRET")?),
            ),
            PaymentProviderKind::Simulated => (None, None),
        };
        let shipping_countries = get_optional_env("SHIPPING_COUNTRIES").map_or(
            defaults.shipping_countries,
            |value| {
                value
                    .split(',')
                    .map(|c| c.trim().to_ascii_uppercase())
                    .filter(|c| !c.is_empty())
                    .collect()
            },
        );

        Ok(Self {
            provider,
            stripe_secret_key,
            webhook_secret,
            api_base: get_env_or_default("STRIPE_API_BASE", &defaults.api_base),
            timeout: Duration::from_secs(parse_env_or_default(
                "PAYMENT_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
            webhook_tolerance: Duration::from_secs(parse_env_or_default(
                "WEBHOOK_TOLERANCE_SECS",
                defaults.webhook_tolerance.as_secs(),
            )?),
            currency: parse_env_or_default("CHECKOUT_CURRENCY", defaults.currency)?,
            shipping_countries,
        })
    }
}

impl NotificationConfig {
    fn from_env(defaults: Self) -> Result<Self, ConfigError> {
        let smtp = match get_optional_env("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_env_or_default("SMTP_PORT", 587_u16)?,
                username: get_required_env("SMTP_USERNAME")?,
                password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
                from_address: get_required_env("EMAIL_FROM")?,
            }),
            None => None,
        };

        Ok(Self {
            smtp,
            admin_email: get_optional_env("ADMIN_NOTIFY_EMAIL"),
            timeout: Duration::from_secs(parse_env_or_default(
                "NOTIFY_TIMEOUT_SECS",
                defaults.timeout.as_secs(),
            )?),
        })
    }
}

fn rate_policies_from_env() -> Result<RatePolicies, ConfigError> {
    let mut policies = RatePolicies::default();
    for class in RouteClass::ALL {
        let key = format!("RATE_LIMIT_{}", class.env_suffix());
        if let Some(value) = get_optional_env(&key) {
            let policy = value
                .parse::<RatePolicy>()
                .map_err(|e| ConfigError::InvalidEnvVar(key.clone(), e))?;
            policies.set(*class, policy);
        }
    }
    Ok(policies)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Option<SecretString> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .filter(|value| !value.is_empty())
        .map(SecretString::from)
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an optional environment variable, falling back to a default.
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |value| {
        value
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
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
    let len = s.chars().count() as f64;
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

    // Real API keys and signing secrets are random
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the value issued by the provider."
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("sk_test_your-key-here", "STRIPE_SECRET_KEY");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("whsec_aaaaaaaaaaaaaaaaaaaaaaaa", "STRIPE_WEBHOOK_SECRET");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("whsec_9fK2mQ7xL4pZ8vB1nR6tY3wC5", "STRIPE_WEBHOOK_SECRET");
        assert!(result.is_ok());
    }

    #[test]
    fn test_payment_provider_kind_parse() {
        assert_eq!(
            "Stripe".parse::<PaymentProviderKind>().unwrap(),
            PaymentProviderKind::Stripe
        );
        assert_eq!(
            "simulated".parse::<PaymentProviderKind>().unwrap(),
            PaymentProviderKind::Simulated
        );
        assert!("paypal".parse::<PaymentProviderKind>().is_err());
    }

    #[test]
    fn test_defaults_and_helpers() {
        let config = StorefrontConfig::new("https://shop.example/");
        assert!(config.secure_cookies());
        assert_eq!(config.url("/checkout/success"), "https://shop.example/checkout/success");
        assert_eq!(config.socket_addr().port(), 3000);
        assert_eq!(config.payment.currency, CurrencyCode::USD);
        assert!(!StorefrontConfig::new("http://localhost:3000").secure_cookies());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut payment = StorefrontConfig::new("http://localhost").payment;
        payment.stripe_secret_key = Some(SecretString::from("sk_live_super_secret_value"));
        let debug_output = format!("{payment:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk_live_super_secret_value"));
        assert_eq!(
            payment.stripe_secret_key.unwrap().expose_secret(),
            "sk_live_super_secret_value"
        );
    }
}

//! Application configuration loaded from environment variables.

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: Postgres event store; in-memory when unset
/// - `FRONTEND_URL`: base for payment redirect URLs
/// - `STRIPE_SECRET_KEY`, `STRIPE_PUBLISHABLE_KEY`, `STRIPE_API_BASE`,
///   `STRIPE_CURRENCY`, `STRIPE_WEBHOOK_SECRET`: payment gateway
/// - `WEBHOOK_TOLERANCE_SECS`: accepted webhook clock skew
/// - `CHECKOUT_SESSION_TTL_MINUTES`: lifetime of a payment session
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub frontend_url: String,
    pub currency: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_publishable_key: Option<String>,
    pub stripe_api_base: String,
    pub webhook_secret: Option<String>,
    pub webhook_tolerance_secs: i64,
    pub session_ttl_minutes: i64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            database_url: var("DATABASE_URL"),
            frontend_url: var("FRONTEND_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.frontend_url),
            currency: var("STRIPE_CURRENCY")
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or(defaults.currency),
            stripe_secret_key: var("STRIPE_SECRET_KEY"),
            stripe_publishable_key: var("STRIPE_PUBLISHABLE_KEY"),
            stripe_api_base: var("STRIPE_API_BASE").unwrap_or(defaults.stripe_api_base),
            webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            webhook_tolerance_secs: var("WEBHOOK_TOLERANCE_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.webhook_tolerance_secs),
            session_ttl_minutes: var("CHECKOUT_SESSION_TTL_MINUTES")
                .and_then(|m| m.parse().ok())
                .filter(|m: &i64| *m > 0)
                .unwrap_or(defaults.session_ttl_minutes),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            frontend_url: "http://localhost:5173".to_string(),
            currency: "usd".to_string(),
            stripe_secret_key: None,
            stripe_publishable_key: None,
            stripe_api_base: "https://api.stripe.com".to_string(),
            webhook_secret: None,
            webhook_tolerance_secs: checkout::webhook::DEFAULT_TOLERANCE_SECS,
            session_ttl_minutes: 30,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("database", &self.database_url.is_some())
            .field("frontend_url", &self.frontend_url)
            .field("currency", &self.currency)
            .field("stripe", &self.stripe_secret_key.is_some())
            .field("stripe_api_base", &self.stripe_api_base)
            .field("webhook_secret", &self.webhook_secret.is_some())
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("session_ttl_minutes", &self.session_ttl_minutes)
            .finish()
    }
}

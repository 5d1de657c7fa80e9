//! Configuration module for share-offer-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use service_core::middleware::rate_limit::RateLimitConfig;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ShareOfferConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// No database configured means the in-memory store.
    pub database: Option<DatabaseConfig>,
    pub admin: AdminConfig,
    pub public_app_url: String,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AdminConfig {
    /// Bearer token for `/admin/*`. When unset every admin request is refused.
    pub token: Option<Secret<String>>,
}

impl Default for ShareOfferConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            service_name: "share-offer-service".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: None,
            admin: AdminConfig::default(),
            public_app_url: "http://localhost:3000".to_string(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}

impl ShareOfferConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let defaults = Self::default();

        let database = env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|url| DatabaseConfig {
                url: Secret::new(url),
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
                min_connections: parse_var("DATABASE_MIN_CONNECTIONS").unwrap_or(2),
            });

        let rate_limit = RateLimitConfig {
            interval: parse_var("RATE_LIMIT_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit.interval),
            capacity: parse_var("RATE_LIMIT_CAPACITY").unwrap_or(defaults.rate_limit.capacity),
            limit: parse_var("RATE_LIMIT_PER_INTERVAL").unwrap_or(defaults.rate_limit.limit),
        };
        if rate_limit.limit == 0 || rate_limit.capacity == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "RATE_LIMIT_PER_INTERVAL and RATE_LIMIT_CAPACITY must be positive"
            )));
        }

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database,
            admin: AdminConfig {
                token: env::var("ADMIN_TOKEN")
                    .ok()
                    .filter(|s| !s.is_empty())
                    .map(Secret::new),
            },
            public_app_url: env::var("PUBLIC_APP_URL").unwrap_or(defaults.public_app_url),
            rate_limit,
        })
    }
}

//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::handlers::PasswordResetSettings;
use crate::jobs::JobSchedulerConfig;
use crate::profile::FetchPolicy;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Age after which cached profile data is refreshed in the background
    pub profile_stale_after: Duration,

    /// Age after which cached profile data is discarded
    pub profile_evict_after: Duration,

    /// Loader attempts per profile fetch cycle
    pub profile_max_attempts: u32,

    /// Public URL of the web client; reset links point here
    pub password_reset_base_url: String,

    pub password_reset_ttl_minutes: i64,

    /// Outbound emails allowed per rolling hour
    pub email_hourly_limit: u32,

    /// Interval of the credential and outbox cleanup job
    pub cleanup_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        Ok(Self {
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_or("PORT", 3000)?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            profile_stale_after: Duration::from_secs(parse_or("PROFILE_STALE_SECS", 30)?),
            profile_evict_after: Duration::from_secs(parse_or("PROFILE_EVICT_SECS", 300)?),
            profile_max_attempts: parse_or("PROFILE_MAX_ATTEMPTS", 3)?,
            password_reset_base_url: env::var("PASSWORD_RESET_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            password_reset_ttl_minutes: parse_or("PASSWORD_RESET_TTL_MINUTES", 60)?,
            email_hourly_limit: parse_or("EMAIL_HOURLY_LIMIT", 100)?,
            cleanup_interval: Duration::from_secs(parse_or("CLEANUP_INTERVAL_SECS", 3600)?),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Orchestrator timers; backoff and debounce keep their defaults
    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            stale_after: self.profile_stale_after,
            evict_after: self.profile_evict_after,
            max_attempts: self.profile_max_attempts,
            ..FetchPolicy::default()
        }
    }

    pub fn scheduler(&self) -> JobSchedulerConfig {
        JobSchedulerConfig {
            cleanup_interval: self.cleanup_interval,
            ..JobSchedulerConfig::default()
        }
    }

    pub fn password_reset(&self) -> PasswordResetSettings {
        PasswordResetSettings {
            base_url: self.password_reset_base_url.clone(),
            token_ttl: chrono::Duration::minutes(self.password_reset_ttl_minutes),
        }
    }
}

/// Value of `name`, or `default` when unset
fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

//! Gateway configuration.
//!
//! DESIGN
//! ======
//! Read once at startup from the environment (after `dotenvy` has loaded an
//! optional `.env`). Required values fail fast; optional values fall back to
//! their defaults when missing or unparsable.

use std::time::Duration;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CALL_DEBOUNCE_MS: u64 = 2000;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_WS_OUTBOUND_BUFFER: usize = 256;
const DEFAULT_MESSAGE_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} required")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub db_max_connections: u32,
    /// Window in which repeated `user_calling` from one connection is dropped.
    pub call_debounce: Duration,
    /// Upper bound on any single external-store call.
    pub store_timeout: Duration,
    /// Capacity of each connection's outbound frame channel.
    pub ws_outbound_buffer: usize,
    pub message_history_limit: i64,
}

impl GatewayConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `DATABASE_URL` or `JWT_SECRET` is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if a required key is absent or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS),
            call_debounce: Duration::from_millis(parse_or(&lookup, "CALL_DEBOUNCE_MS", DEFAULT_CALL_DEBOUNCE_MS)),
            store_timeout: Duration::from_millis(parse_or(&lookup, "STORE_TIMEOUT_MS", DEFAULT_STORE_TIMEOUT_MS)),
            ws_outbound_buffer: parse_or(&lookup, "WS_OUTBOUND_BUFFER", DEFAULT_WS_OUTBOUND_BUFFER).max(1),
            message_history_limit: parse_or(&lookup, "MESSAGE_HISTORY_LIMIT", DEFAULT_MESSAGE_HISTORY_LIMIT).max(1),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

//! Process configuration, read from the environment (and an optional `.env`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use bazaar_observability::{LogConfig, LogFormat};
use bazaar_orders::TransitionPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Behavioural knobs of the order service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSettings {
    pub transition_policy: TransitionPolicy,
    pub op_timeout: Duration,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            transition_policy: TransitionPolicy::Permissive,
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory backends.
    pub database: Option<DatabaseConfig>,
    pub orders: OrderSettings,
    pub catalog_seed_file: Option<PathBuf>,
    pub log: LogConfig,
}

impl AppConfig {
    /// Load from the process environment after applying `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .trim()
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("BIND_ADDR", e.to_string()))?;

        let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
            Some(raw) => parse_number::<u32>("DATABASE_MAX_CONNECTIONS", &raw)?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(ConfigError::invalid("DATABASE_MAX_CONNECTIONS", "must be at least 1"));
        }
        let database = get("DATABASE_URL").map(|url| DatabaseConfig {
            url,
            max_connections,
        });

        let strict = match get("ORDER_STRICT_TRANSITIONS") {
            Some(raw) => parse_flag("ORDER_STRICT_TRANSITIONS", &raw)?,
            None => false,
        };
        let timeout_ms = match get("ORDER_OP_TIMEOUT_MS") {
            Some(raw) => parse_number::<u64>("ORDER_OP_TIMEOUT_MS", &raw)?,
            None => DEFAULT_OP_TIMEOUT_MS,
        };
        if timeout_ms == 0 {
            return Err(ConfigError::invalid("ORDER_OP_TIMEOUT_MS", "must be positive"));
        }

        let format = match get("LOG_FORMAT") {
            Some(raw) => LogFormat::parse(&raw)
                .ok_or_else(|| ConfigError::invalid("LOG_FORMAT", "expected json or pretty"))?,
            None => LogFormat::Json,
        };

        Ok(Self {
            bind_addr,
            database,
            orders: OrderSettings {
                transition_policy: TransitionPolicy::from_strict_flag(strict),
                op_timeout: Duration::from_millis(timeout_ms),
            },
            catalog_seed_file: get("CATALOG_SEED_FILE").map(PathBuf::from),
            log: LogConfig { format },
        })
    }
}

fn parse_number<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::invalid(var, e.to_string()))
}

fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(var, format!("'{other}' is not a boolean"))),
    }
}

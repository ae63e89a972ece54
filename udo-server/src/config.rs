use std::{env, str::FromStr};

use thiserror::Error;
use udo_core::is_valid_utc_offset;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

/// Deployment settings, read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    /// Postgres connection string. The in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Shared secret for the import endpoints. Imports are refused when absent.
    pub migration_secret: Option<String>,
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a number, got {value:?}")]
    Malformed { name: &'static str, value: String },
    #[error("{name} is out of range, got {value}")]
    OutOfRange { name: &'static str, value: i64 },
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let utc_offset_minutes: Option<i32> = parse(&lookup, "UDO_UTC_OFFSET_MINUTES")?;

        if let Some(minutes) = utc_offset_minutes.filter(|m| !is_valid_utc_offset(*m)) {
            return Err(ConfigError::OutOfRange {
                name: "UDO_UTC_OFFSET_MINUTES",
                value: minutes.into(),
            });
        }

        Ok(Self {
            port: parse(&lookup, "UDO_SERVER_PORT")?.unwrap_or(DEFAULT_PORT),
            database_url: non_empty("DATABASE_URL"),
            migration_secret: non_empty("UDO_MIGRATION_SECRET"),
            utc_offset_minutes,
        })
    }
}

fn parse<F, T>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Malformed { name, value })
        })
        .transpose()
}

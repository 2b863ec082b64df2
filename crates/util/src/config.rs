use std::{net::SocketAddr, str::FromStr};

use thiserror::Error;

pub const ENV_KEY: &str = "APP_ENV";
pub const BIND_ADDR_KEY: &str = "APP_BIND_ADDR";
pub const DATABASE_URL_KEY: &str = "DATABASE_URL";

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://staffdir.db?mode=rwc";

/// Deployment flavour; selects the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            _ => Err(ConfigError::InvalidEnvironment(value.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{ENV_KEY} must be development, production or test (got {0:?})")]
    InvalidEnvironment(String),
    #[error("invalid {BIND_ADDR_KEY} {value:?}: {source}")]
    BindAddress {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("{DATABASE_URL_KEY} must not be empty")]
    EmptyDatabaseUrl,
}

/// Settings the server needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
}

impl AppConfig {
    /// Reads the process environment (after [`crate::load_env_file`]).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unset keys fall back to
    /// defaults; a set but blank `DATABASE_URL` is rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup(ENV_KEY) {
            Some(raw) => raw.parse()?,
            None => Environment::default(),
        };

        let raw_addr = lookup(BIND_ADDR_KEY).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .trim()
            .parse()
            .map_err(|source| ConfigError::BindAddress {
                value: raw_addr.clone(),
                source,
            })?;

        let database_url =
            lookup(DATABASE_URL_KEY).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        if database_url.trim().is_empty() {
            return Err(ConfigError::EmptyDatabaseUrl);
        }

        Ok(Self {
            bind_addr,
            environment,
            database_url,
        })
    }
}

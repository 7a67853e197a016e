//! Service configuration loaded from environment variables.
//!
//! Fails fast: a missing `DATABASE_URL` or an out-of-range value stops the
//! process before anything binds or connects.

use accredia_api_accreditation::EngineConfig;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Accepted range for `IDENTITY_CHUNK_SIZE`.
const IDENTITY_CHUNK_RANGE: std::ops::RangeInclusive<usize> = 1..=500;

/// Application environment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Production,
}

impl AppEnvironment {
    /// Parse from the `APP_ENV` value. Defaults to `Development` if
    /// unrecognized.
    pub fn from_env_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => {
                tracing::warn!(
                    value = other,
                    "Unrecognized APP_ENV value, defaulting to Development"
                );
                Self::Development
            }
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

impl std::fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Service configuration.
#[derive(Clone)]
pub struct Config {
    pub app_env: AppEnvironment,
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub db_max_connections: u32,
    pub engine: EngineConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("app_env", &self.app_env)
            .field("database_url", &"[redacted]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rust_log", &self.rust_log)
            .field("db_max_connections", &self.db_max_connections)
            .field("engine", &self.engine)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Required Variables
    ///
    /// - `DATABASE_URL` - PostgreSQL connection string
    ///
    /// # Optional Variables
    ///
    /// - `APP_ENV` - `development` (default) or `production`
    /// - `HOST` - Bind address (default: "0.0.0.0")
    /// - `PORT` - Listen port (default: 8080)
    /// - `RUST_LOG` - Log level filter (default: "info")
    /// - `DB_MAX_CONNECTIONS` - Pool size (default: 10)
    /// - `MAX_BATCH_ROWS` - Largest accepted batch (default: 2000)
    /// - `IDENTITY_CHUNK_SIZE` - Persons created per chunk (default: 50, 1..=500)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_env = AppEnvironment::from_env_str(
            &lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
        );

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_or(&lookup, "PORT", 8080)?;
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "PORT".to_string(),
                message: "Port must be between 1 and 65535".to_string(),
            });
        }

        let rust_log = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());

        let db_max_connections: u32 = parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?;
        if db_max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                var: "DB_MAX_CONNECTIONS".to_string(),
                message: "At least one connection is required".to_string(),
            });
        }

        let max_batch_rows: usize = parse_or(
            &lookup,
            "MAX_BATCH_ROWS",
            accredia_api_accreditation::services::DEFAULT_MAX_BATCH_ROWS,
        )?;
        if max_batch_rows == 0 {
            return Err(ConfigError::InvalidValue {
                var: "MAX_BATCH_ROWS".to_string(),
                message: "Must accept at least one row".to_string(),
            });
        }

        let identity_chunk_size: usize = parse_or(
            &lookup,
            "IDENTITY_CHUNK_SIZE",
            accredia_api_accreditation::services::DEFAULT_IDENTITY_CHUNK_SIZE,
        )?;
        if !IDENTITY_CHUNK_RANGE.contains(&identity_chunk_size) {
            return Err(ConfigError::InvalidValue {
                var: "IDENTITY_CHUNK_SIZE".to_string(),
                message: format!(
                    "Must be between {} and {}",
                    IDENTITY_CHUNK_RANGE.start(),
                    IDENTITY_CHUNK_RANGE.end()
                ),
            });
        }

        Ok(Self {
            app_env,
            database_url,
            host,
            port,
            rust_log,
            db_max_connections,
            engine: EngineConfig {
                max_batch_rows,
                identity_chunk_size,
            },
        })
    }

    /// Socket address string to bind.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T, F>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                var: var.to_string(),
                message: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/accredia")]).unwrap();
        assert_eq!(config.app_env, AppEnvironment::Development);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.rust_log, "info");
        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.engine.max_batch_rows, 2000);
        assert_eq!(config.engine.identity_chunk_size, 50);
    }

    #[test]
    fn test_database_url_required() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "DATABASE_URL"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db/accredia"),
            ("APP_ENV", "prod"),
            ("HOST", "127.0.0.1"),
            ("PORT", "3000"),
            ("MAX_BATCH_ROWS", "500"),
            ("IDENTITY_CHUNK_SIZE", "25"),
        ])
        .unwrap();
        assert!(config.app_env.is_production());
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
        assert_eq!(config.engine.max_batch_rows, 500);
        assert_eq!(config.engine.identity_chunk_size, 25);
    }

    #[test]
    fn test_chunk_size_out_of_range() {
        for value in ["0", "501"] {
            let err = load(&[
                ("DATABASE_URL", "postgres://db/accredia"),
                ("IDENTITY_CHUNK_SIZE", value),
            ])
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "IDENTITY_CHUNK_SIZE")
            );
        }
    }

    #[test]
    fn test_unparsable_port() {
        let err = load(&[("DATABASE_URL", "postgres://db/accredia"), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "PORT"));
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = load(&[("DATABASE_URL", "postgres://user:secret@db/accredia")]).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[redacted]"));
    }
}

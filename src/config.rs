//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::store::{PostgresStoreConfig, RedisStoreConfig, DEFAULT_MAX_EVENTS_PER_TYPE};

/// Which persistence backend the mediator gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "" => Ok(StoreBackend::Memory),
            "redis" => Ok(StoreBackend::Redis),
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            _ => Err(ConfigError::InvalidValue("MEDIATOR_STORE")),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreBackend,

    /// Redis connection URL, required for the redis backend
    pub redis_url: Option<String>,

    /// Postgres connection URL, required for the postgres backend
    pub database_url: Option<String>,

    /// Key namespace / table name; backend default when unset
    pub prefix: Option<String>,

    pub max_events_per_type: i64,

    /// Redis only
    pub event_ttl: Duration,

    /// Serve Prometheus metrics on this port when set
    pub metrics_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store: StoreBackend = env::var("MEDIATOR_STORE")
            .unwrap_or_else(|_| "memory".to_string())
            .parse()?;

        let redis_url = env::var("REDIS_URL").ok();
        let database_url = env::var("DATABASE_URL").ok();

        match store {
            StoreBackend::Redis if redis_url.is_none() => {
                return Err(ConfigError::MissingEnv("REDIS_URL"))
            }
            StoreBackend::Postgres if database_url.is_none() => {
                return Err(ConfigError::MissingEnv("DATABASE_URL"))
            }
            _ => {}
        }

        let prefix = env::var("MEDIATOR_PREFIX").ok().filter(|p| !p.is_empty());

        let max_events_per_type: i64 = env::var("MEDIATOR_MAX_EVENTS_PER_TYPE")
            .unwrap_or_else(|_| DEFAULT_MAX_EVENTS_PER_TYPE.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("MEDIATOR_MAX_EVENTS_PER_TYPE"))?;

        let event_ttl_secs: u64 = env::var("MEDIATOR_EVENT_TTL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("MEDIATOR_EVENT_TTL_SECS"))?;

        let metrics_port: Option<u16> = env::var("METRICS_PORT")
            .ok()
            .map(|port| port.parse())
            .transpose()
            .map_err(|_| ConfigError::InvalidValue("METRICS_PORT"))?;

        Ok(Self {
            store,
            redis_url,
            database_url,
            prefix,
            max_events_per_type,
            event_ttl: Duration::from_secs(event_ttl_secs),
            metrics_port,
        })
    }

    pub fn redis_store_config(&self) -> RedisStoreConfig {
        let defaults = RedisStoreConfig::default();
        RedisStoreConfig {
            prefix: self.prefix.clone().unwrap_or(defaults.prefix),
            event_ttl: self.event_ttl,
            max_events_per_type: self.max_events_per_type,
        }
    }

    pub fn postgres_store_config(&self) -> PostgresStoreConfig {
        let defaults = PostgresStoreConfig::default();
        PostgresStoreConfig {
            prefix: self.prefix.clone().unwrap_or(defaults.prefix),
            max_events_per_type: self.max_events_per_type,
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("redis".parse::<StoreBackend>().unwrap(), StoreBackend::Redis);
        assert_eq!("Postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!("".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("kafka".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_backend_configs_fall_back_to_default_prefix() {
        let config = Config {
            store: StoreBackend::Memory,
            redis_url: None,
            database_url: None,
            prefix: None,
            max_events_per_type: 50,
            event_ttl: Duration::from_secs(60),
            metrics_port: None,
        };

        let redis = config.redis_store_config();
        assert_eq!(redis.prefix, "mediator:events");
        assert_eq!(redis.max_events_per_type, 50);
        assert_eq!(redis.event_ttl, Duration::from_secs(60));

        let postgres = config.postgres_store_config();
        assert_eq!(postgres.prefix, "mediator_events");
        assert_eq!(postgres.max_events_per_type, 50);
    }
}

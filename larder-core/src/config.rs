//! Configuration consumed when a store is constructed.
//!
//! Everything here deserializes with serde and falls back to sensible defaults, so a
//! composition root can load it from whatever source it already uses.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level store configuration.
///
/// When `mongodb` is absent the composition root falls back to the in-memory store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub mongodb: Option<MongoDbConfig>,
}

/// Connection parameters for the MongoDB backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MongoDbConfig {
    /// Connection string, e.g. `mongodb://localhost:27017`.
    pub dsn: String,
    /// Database holding the collections.
    pub database: String,
}

/// Configuration for retry behavior on transient and rate-limited failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts allowed for transient failures, including the first.
    /// Default: 3
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay after the first transient failure; doubles on each further one.
    /// Default: 100
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the random jitter added to each backoff delay.
    /// Default: 50
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,

    /// Wait used when a rate-limited response carries no suggestion.
    /// Default: 1000
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,

    /// Extra attempts allowed for rate-limited failures, counted separately.
    /// Default: 5
    #[serde(default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Overall deadline applied to every operation unless the caller sets one.
    /// Default: none
    #[serde(default)]
    pub operation_timeout_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_jitter_ms() -> u64 {
    50
}

fn default_rate_limit_delay_ms() -> u64 {
    1000
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
            rate_limit_delay_ms: default_rate_limit_delay_ms(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            operation_timeout_ms: None,
        }
    }
}

impl RetryConfig {
    /// A policy that never retries; useful in tests.
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            max_rate_limit_retries: 0,
            ..Self::default()
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: StoreConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(100));
        assert!(config.mongodb.is_none());
    }

    #[test]
    fn partial_retry_config_keeps_other_defaults() {
        let config: StoreConfig = serde_json::from_str(
            r#"{
                "retry": { "max_attempts": 5, "operation_timeout_ms": 2000 },
                "mongodb": { "dsn": "mongodb://localhost:27017", "database": "recipes" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.max_jitter_ms, 50);
        assert_eq!(config.retry.operation_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.mongodb.unwrap().database, "recipes");
    }
}

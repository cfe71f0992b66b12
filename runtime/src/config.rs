//! Engine configuration.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taproom_inventory_core::variance::VarianceThresholds;

use crate::retry::RetryPolicy;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Variance thresholds above which a discrepancy is `large`
    pub variance: VarianceThresholds,
    /// Reconciliation attempts before giving up on repeated conflicts
    pub max_cas_attempts: usize,
    /// Store retry configuration
    pub store_retry: StoreRetryConfig,
    /// Maximum entries kept in the dead-letter list
    pub dead_letter_max: usize,
    /// Path of the client-side offline log
    pub offline_log_path: PathBuf,
}

/// Backoff applied to transient store failures
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreRetryConfig {
    /// Retries after the first failed attempt
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,
    /// Cap on the delay between retries, in milliseconds
    pub max_delay_ms: u64,
}

impl StoreRetryConfig {
    /// Retry policy for store calls
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(self.max_retries)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .build()
    }
}

impl Default for StoreRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            variance: VarianceThresholds::default(),
            max_cas_attempts: 5,
            store_retry: StoreRetryConfig::default(),
            dead_letter_max: 1000,
            offline_log_path: PathBuf::from("./inventory-offline.log"),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparsable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            variance: VarianceThresholds {
                absolute_units: lookup("INVENTORY_VARIANCE_ABSOLUTE_UNITS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.variance.absolute_units),
                relative: lookup("INVENTORY_VARIANCE_RELATIVE")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.variance.relative),
            },
            max_cas_attempts: lookup("INVENTORY_RECONCILE_MAX_CAS_ATTEMPTS")
                .and_then(|s| s.parse().ok())
                .filter(|attempts| *attempts > 0)
                .unwrap_or(defaults.max_cas_attempts),
            store_retry: StoreRetryConfig {
                max_retries: lookup("INVENTORY_STORE_MAX_RETRIES")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.store_retry.max_retries),
                initial_delay_ms: lookup("INVENTORY_STORE_RETRY_INITIAL_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.store_retry.initial_delay_ms),
                max_delay_ms: lookup("INVENTORY_STORE_RETRY_MAX_MS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.store_retry.max_delay_ms),
            },
            dead_letter_max: lookup("INVENTORY_DEAD_LETTER_MAX")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.dead_letter_max),
            offline_log_path: lookup("INVENTORY_OFFLINE_LOG_PATH")
                .map_or(defaults.offline_log_path, PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(|_| None);
        assert!((config.variance.absolute_units - 2.0).abs() < f64::EPSILON);
        assert!((config.variance.relative - 0.20).abs() < f64::EPSILON);
        assert_eq!(config.max_cas_attempts, 5);
        assert_eq!(config.store_retry.max_retries, 3);
        assert_eq!(config.dead_letter_max, 1000);
        assert_eq!(config.offline_log_path, PathBuf::from("./inventory-offline.log"));
    }

    #[test]
    fn overrides_and_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("INVENTORY_VARIANCE_RELATIVE", "0.1"),
            ("INVENTORY_RECONCILE_MAX_CAS_ATTEMPTS", "0"),
            ("INVENTORY_STORE_MAX_RETRIES", "not-a-number"),
            ("INVENTORY_STORE_RETRY_INITIAL_MS", "5"),
            ("INVENTORY_OFFLINE_LOG_PATH", "/tmp/offline.log"),
        ]);
        let config = EngineConfig::from_lookup(|key| vars.get(key).map(ToString::to_string));

        assert!((config.variance.relative - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.max_cas_attempts, 5);
        assert_eq!(config.store_retry.max_retries, 3);
        assert_eq!(config.store_retry.initial_delay_ms, 5);
        assert_eq!(config.offline_log_path, PathBuf::from("/tmp/offline.log"));
        assert_eq!(
            config.store_retry.policy().initial_delay,
            Duration::from_millis(5)
        );
    }
}

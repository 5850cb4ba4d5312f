use crate::error::{ModstrapError, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use std::time::Duration;

/// Configuration service
#[derive(Clone, Default)]
pub struct ConfigService {
    config: Arc<DashMap<String, String>>,
}

impl ConfigService {
    /// Snapshot of the process environment.
    pub fn from_env() -> Self {
        let service = Self::default();
        for (key, value) in env::vars() {
            service.set(&key, &value);
        }
        service
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.config.get(key).map(|v| v.clone())
    }

    pub fn set(&self, key: &str, value: &str) {
        self.config.insert(key.to_string(), value.to_string());
    }

    /// Read a millisecond duration, `Ok(None)` if the key is absent.
    pub fn get_millis(&self, key: &str) -> Result<Option<Duration>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(|ms| Some(Duration::from_millis(ms)))
                .map_err(|_| ModstrapError::InvalidConfig {
                    key: key.to_string(),
                    value: raw,
                }),
        }
    }
}

pub const HOOK_TIMEOUT_KEY: &str = "MODSTRAP_HOOK_TIMEOUT_MS";
pub const HOOK_ABANDON_GRACE_KEY: &str = "MODSTRAP_HOOK_ABANDON_GRACE_MS";
pub const GRACEFUL_SHUTDOWN_KEY: &str = "MODSTRAP_GRACEFUL_SHUTDOWN_MS";
pub const FORCE_SHUTDOWN_KEY: &str = "MODSTRAP_FORCE_SHUTDOWN_MS";
pub const FORCED_ENTRY_TIMEOUT_KEY: &str = "MODSTRAP_FORCED_ENTRY_TIMEOUT_MS";

/// Timing knobs for startup and teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Timeout applied to hooks that do not declare their own.
    pub default_hook_timeout: Duration,
    /// How long to wait for a cancelled hook task to actually stop before
    /// abandoning it.
    pub hook_abandon_grace: Duration,
    /// Global deadline for the graceful shutdown pass.
    pub graceful_shutdown_timeout: Duration,
    /// Global deadline for the forced shutdown pass.
    pub force_shutdown_timeout: Duration,
    /// Per-entry timeout for forced shutdown entries registered without one.
    pub default_forced_entry_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            default_hook_timeout: Duration::from_secs(30),
            hook_abandon_grace: Duration::from_secs(1),
            graceful_shutdown_timeout: Duration::from_secs(30),
            force_shutdown_timeout: Duration::from_secs(5),
            default_forced_entry_timeout: Duration::from_secs(1),
        }
    }
}

impl LifecycleConfig {
    /// Build from `MODSTRAP_*` keys, falling back to defaults for absent keys.
    ///
    /// # Errors
    /// Returns [`ModstrapError::InvalidConfig`] if a present key is not a
    /// whole number of milliseconds.
    pub fn from_config(config: &ConfigService) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            default_hook_timeout: config
                .get_millis(HOOK_TIMEOUT_KEY)?
                .unwrap_or(defaults.default_hook_timeout),
            hook_abandon_grace: config
                .get_millis(HOOK_ABANDON_GRACE_KEY)?
                .unwrap_or(defaults.hook_abandon_grace),
            graceful_shutdown_timeout: config
                .get_millis(GRACEFUL_SHUTDOWN_KEY)?
                .unwrap_or(defaults.graceful_shutdown_timeout),
            force_shutdown_timeout: config
                .get_millis(FORCE_SHUTDOWN_KEY)?
                .unwrap_or(defaults.force_shutdown_timeout),
            default_forced_entry_timeout: config
                .get_millis(FORCED_ENTRY_TIMEOUT_KEY)?
                .unwrap_or(defaults.default_forced_entry_timeout),
        })
    }

    /// Shorthand for `from_config(&ConfigService::from_env())`.
    pub fn from_env() -> Result<Self> {
        Self::from_config(&ConfigService::from_env())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_keys_use_defaults() {
        let config = LifecycleConfig::from_config(&ConfigService::default()).unwrap();
        assert_eq!(config, LifecycleConfig::default());
    }

    #[test]
    fn test_reads_millisecond_overrides() {
        let service = ConfigService::default();
        service.set(HOOK_TIMEOUT_KEY, "250");
        service.set(FORCE_SHUTDOWN_KEY, " 40 ");
        let config = LifecycleConfig::from_config(&service).unwrap();
        assert_eq!(config.default_hook_timeout, Duration::from_millis(250));
        assert_eq!(config.force_shutdown_timeout, Duration::from_millis(40));
        assert_eq!(config.hook_abandon_grace, Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_non_numeric_value() {
        let service = ConfigService::default();
        service.set(GRACEFUL_SHUTDOWN_KEY, "soon");
        let err = LifecycleConfig::from_config(&service).unwrap_err();
        assert!(
            matches!(err, ModstrapError::InvalidConfig { key, value } if key == GRACEFUL_SHUTDOWN_KEY && value == "soon")
        );
    }
}

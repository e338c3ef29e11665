// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle configuration.
//!
//! Sources, lowest to highest precedence:
//!
//! 1. [`LifecycleConfig::default`]
//! 2. YAML ([`LifecycleConfig::from_yaml_str`], [`LifecycleConfig::from_yaml_file`])
//! 3. Environment ([`LifecycleConfig::with_env_overrides`])
//!
//! # Example YAML
//!
//! ```yaml
//! # lifecycle.yaml
//! teardown_timeout_ms: 2000
//! max_native_delete_attempts: 5
//! deferred_queue_capacity: 256
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Maximum domain ID per DDS specification (RTPS v2.3 Sec.9.6.1.1)
pub const MAX_DOMAIN_ID: u32 = 232;

/// Default bound on one `delete` call (children, in-flight wait, native delete).
pub const DEFAULT_TEARDOWN_TIMEOUT_MS: u64 = 5_000;

/// Native delete failures tolerated before the handle is abandoned.
pub const DEFAULT_MAX_NATIVE_DELETE_ATTEMPTS: u32 = 3;

/// Pending deferred deletes before `delete_deferred` starts refusing.
pub const DEFAULT_DEFERRED_QUEUE_CAPACITY: usize = 1024;

/// Environment override for `teardown_timeout` (milliseconds).
pub const ENV_TEARDOWN_TIMEOUT_MS: &str = "HDDS_ENTITY_TEARDOWN_TIMEOUT_MS";
/// Environment override for `max_native_delete_attempts`.
pub const ENV_MAX_DELETE_ATTEMPTS: &str = "HDDS_ENTITY_MAX_DELETE_ATTEMPTS";
/// Environment override for `deferred_queue_capacity`.
pub const ENV_DEFERRED_CAPACITY: &str = "HDDS_ENTITY_DEFERRED_CAPACITY";

/// Tunables of the [`LifecycleCoordinator`](crate::LifecycleCoordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Deadline applied by `delete` when the caller does not pass one.
    pub teardown_timeout: Duration,
    /// Failed native deletes before the handle is abandoned (leaked).
    pub max_native_delete_attempts: u32,
    /// Capacity of the deferred deletion queue.
    pub deferred_queue_capacity: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            teardown_timeout: Duration::from_millis(DEFAULT_TEARDOWN_TIMEOUT_MS),
            max_native_delete_attempts: DEFAULT_MAX_NATIVE_DELETE_ATTEMPTS,
            deferred_queue_capacity: DEFAULT_DEFERRED_QUEUE_CAPACITY,
        }
    }
}

/// YAML document; every key is optional and falls back to the defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct YamlLifecycleConfig {
    teardown_timeout_ms: Option<u64>,
    max_native_delete_attempts: Option<u32>,
    deferred_queue_capacity: Option<usize>,
}

impl LifecycleConfig {
    /// Builder-style override of the teardown timeout.
    #[must_use]
    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    /// Builder-style override of the native delete attempt limit.
    #[must_use]
    pub fn with_max_native_delete_attempts(mut self, attempts: u32) -> Self {
        self.max_native_delete_attempts = attempts;
        self
    }

    /// Builder-style override of the deferred queue capacity.
    #[must_use]
    pub fn with_deferred_queue_capacity(mut self, capacity: usize) -> Self {
        self.deferred_queue_capacity = capacity;
        self
    }

    /// Parse a YAML document on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on malformed YAML, unknown keys or invalid values.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let doc: YamlLifecycleConfig = if yaml.trim().is_empty() {
            YamlLifecycleConfig::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?
        };

        let mut config = Self::default();
        if let Some(ms) = doc.teardown_timeout_ms {
            config.teardown_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = doc.max_native_delete_attempts {
            config.max_native_delete_attempts = attempts;
        }
        if let Some(capacity) = doc.deferred_queue_capacity {
            config.deferred_queue_capacity = capacity;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigFileNotFound` if the file does not exist, otherwise
    /// the errors of [`LifecycleConfig::from_yaml_str`].
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigFileNotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Apply `HDDS_ENTITY_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a variable is set but not a valid number.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_TEARDOWN_TIMEOUT_MS)? {
            self.teardown_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32>(&lookup, ENV_MAX_DELETE_ATTEMPTS)? {
            self.max_native_delete_attempts = attempts;
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, ENV_DEFERRED_CAPACITY)? {
            self.deferred_queue_capacity = capacity;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero attempt limit or a zero queue capacity.
    pub fn validate(&self) -> Result<()> {
        if self.max_native_delete_attempts == 0 {
            return Err(Error::Config(
                "max_native_delete_attempts must be at least 1".to_string(),
            ));
        }
        if self.deferred_queue_capacity == 0 {
            return Err(Error::Config(
                "deferred_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{}: invalid value '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_temp_yaml(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("create temp file");
        f.write_all(content.as_bytes()).expect("write temp file");
        f.flush().expect("flush temp file");
        f
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = LifecycleConfig::default();
        assert_eq!(config.teardown_timeout, Duration::from_secs(5));
        assert_eq!(config.max_native_delete_attempts, 3);
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = LifecycleConfig::from_yaml_str("teardown_timeout_ms: 250\n")
            .expect("should parse");
        assert_eq!(config.teardown_timeout, Duration::from_millis(250));
        assert_eq!(
            config.max_native_delete_attempts,
            DEFAULT_MAX_NATIVE_DELETE_ATTEMPTS
        );
        assert_eq!(
            config.deferred_queue_capacity,
            DEFAULT_DEFERRED_QUEUE_CAPACITY
        );
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let file = write_temp_yaml(concat!(
            "teardown_timeout_ms: 2000\n",
            "max_native_delete_attempts: 5\n",
            "deferred_queue_capacity: 16\n",
        ));
        let config = LifecycleConfig::from_yaml_file(file.path()).expect("should load");
        assert_eq!(config.teardown_timeout, Duration::from_secs(2));
        assert_eq!(config.max_native_delete_attempts, 5);
        assert_eq!(config.deferred_queue_capacity, 16);
    }

    #[test]
    fn test_missing_file() {
        let err = LifecycleConfig::from_yaml_file(Path::new("/nonexistent/lifecycle.yaml"))
            .expect_err("missing file");
        assert!(matches!(err, Error::ConfigFileNotFound(_)));
    }

    #[test]
    fn test_rejects_unknown_keys_and_invalid_values() {
        assert!(matches!(
            LifecycleConfig::from_yaml_str("teardown_timeout: 3\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            LifecycleConfig::from_yaml_str("max_native_delete_attempts: 0\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_TEARDOWN_TIMEOUT_MS, "100"),
            (ENV_MAX_DELETE_ATTEMPTS, " 7 "),
        ]
        .into_iter()
        .collect();
        let config = LifecycleConfig::default()
            .with_overrides_from(|key| vars.get(key).map(|v| (*v).to_string()))
            .expect("valid overrides");
        assert_eq!(config.teardown_timeout, Duration::from_millis(100));
        assert_eq!(config.max_native_delete_attempts, 7);

        let err = LifecycleConfig::default()
            .with_overrides_from(|key| (key == ENV_DEFERRED_CAPACITY).then(|| "lots".to_string()))
            .expect_err("non-numeric value");
        assert!(err.to_string().contains(ENV_DEFERRED_CAPACITY));
    }
}

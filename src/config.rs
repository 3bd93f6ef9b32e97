//! Runtime configuration.
//!
//! Settings come from a key-value [`ConfigSource`]. The process environment
//! (optionally seeded from a `.env` file) is the production source; an
//! in-memory map is used for tests and embedding.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

/// Key holding the age (seconds) after which an unfilled order is cancelled.
pub const CANCEL_TIME_SPAN: &str = "CANCEL_TIME_SPAN";

/// Key holding the interval (seconds) between reconciliation passes.
pub const RECONCILE_INTERVAL: &str = "RECONCILE_INTERVAL";

const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 5;

/// Errors that can occur when reading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration key '{0}'")]
    Missing(String),

    #[error("Invalid value '{value}' for '{key}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

/// Key-value configuration lookup.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads keys from the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvConfigSource {
    prefix: Option<String>,
}

impl EnvConfigSource {
    /// Environment source, loading a `.env` file from the working directory if present.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::default()
    }

    /// Look keys up as `{prefix}_{key}` (e.g. `TRADER_CANCEL_TIME_SPAN`).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl ConfigSource for EnvConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        let name = match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key),
            None => key.to_string(),
        };
        std::env::var(name).ok()
    }
}

/// In-memory configuration.
#[derive(Debug, Clone, Default)]
pub struct MapConfigSource {
    values: HashMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Settings for the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Orders older than this are cancelled
    pub cancel_after: Duration,
    /// Delay between periodic passes
    pub interval: Duration,
}

impl ReconcileSettings {
    pub fn new(cancel_after: Duration, interval: Duration) -> Self {
        Self {
            cancel_after,
            interval,
        }
    }

    /// Read settings from `source`.
    ///
    /// # Errors
    /// `CANCEL_TIME_SPAN` is required; a missing or unparsable value is an
    /// error rather than a silent default.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let raw = source
            .get(CANCEL_TIME_SPAN)
            .ok_or_else(|| ConfigError::Missing(CANCEL_TIME_SPAN.to_string()))?;
        let cancel_after = parse_seconds(CANCEL_TIME_SPAN, &raw)?;

        let interval = match source.get(RECONCILE_INTERVAL) {
            Some(raw) => parse_seconds(RECONCILE_INTERVAL, &raw)?,
            None => Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
        };
        if interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: RECONCILE_INTERVAL.to_string(),
                value: "0".to_string(),
                reason: "interval must be positive".to_string(),
            });
        }

        Ok(Self {
            cancel_after,
            interval,
        })
    }
}

fn parse_seconds(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| ConfigError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_source() {
        let source = MapConfigSource::new()
            .with(CANCEL_TIME_SPAN, "60")
            .with(RECONCILE_INTERVAL, " 10 ");

        let settings = ReconcileSettings::from_source(&source).unwrap();
        assert_eq!(settings.cancel_after, Duration::from_secs(60));
        assert_eq!(settings.interval, Duration::from_secs(10));
    }

    #[test]
    fn test_interval_defaults() {
        let source = MapConfigSource::new().with(CANCEL_TIME_SPAN, "30");
        let settings = ReconcileSettings::from_source(&source).unwrap();
        assert_eq!(
            settings.interval,
            Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS)
        );
    }

    #[test]
    fn test_missing_threshold_is_error() {
        let err = ReconcileSettings::from_source(&MapConfigSource::new()).unwrap_err();
        assert_eq!(err, ConfigError::Missing(CANCEL_TIME_SPAN.to_string()));
    }

    #[test]
    fn test_unparsable_threshold_is_error() {
        let source = MapConfigSource::new().with(CANCEL_TIME_SPAN, "one minute");
        match ReconcileSettings::from_source(&source) {
            Err(ConfigError::Invalid { key, value, .. }) => {
                assert_eq!(key, CANCEL_TIME_SPAN);
                assert_eq!(value, "one minute");
            }
            other => panic!("Expected ConfigError::Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_interval_rejected() {
        let source = MapConfigSource::new()
            .with(CANCEL_TIME_SPAN, "30")
            .with(RECONCILE_INTERVAL, "0");
        assert!(ReconcileSettings::from_source(&source).is_err());
    }

    #[test]
    fn test_env_source_prefix() {
        std::env::set_var("TRADER_BASE_TEST_CANCEL_TIME_SPAN", "15");
        let source = EnvConfigSource::default().with_prefix("TRADER_BASE_TEST");
        assert_eq!(source.get(CANCEL_TIME_SPAN), Some("15".to_string()));
    }
}

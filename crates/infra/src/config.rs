//! Configuration loading and representation.

use serde::{Deserialize, Serialize};

use paydesk_observability::LogFormat;
use paydesk_payments::DEFAULT_MAX_MESSAGE_LEN;

pub const ENV_MAX_MESSAGE_LEN: &str = "PAYDESK_MAX_MESSAGE_LEN";
pub const ENV_LOG_FORMAT: &str = "PAYDESK_LOG_FORMAT";

/// Runtime configuration for a ledger service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Upper bound on a payment message, in bytes.
    pub max_message_len: usize,
    pub log_format: LogFormat,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            log_format: LogFormat::default(),
        }
    }
}

impl LedgerConfig {
    /// Load from process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unparsable values are logged and
    /// replaced by the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_MESSAGE_LEN) {
            match raw.trim().parse::<usize>() {
                Ok(n) => config.max_message_len = n,
                Err(e) => tracing::warn!(
                    key = ENV_MAX_MESSAGE_LEN,
                    value = %raw,
                    error = %e,
                    "ignoring invalid setting"
                ),
            }
        }

        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            match raw.parse::<LogFormat>() {
                Ok(f) => config.log_format = f,
                Err(e) => tracing::warn!(key = ENV_LOG_FORMAT, error = %e, "ignoring invalid setting"),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_keys_yield_defaults() {
        let config = LedgerConfig::from_lookup(|_| None);
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.max_message_len, DEFAULT_MAX_MESSAGE_LEN);
    }

    #[test]
    fn valid_values_override_defaults() {
        let config = LedgerConfig::from_lookup(lookup_from(&[
            (ENV_MAX_MESSAGE_LEN, "64"),
            (ENV_LOG_FORMAT, "pretty"),
        ]));
        assert_eq!(config.max_message_len, 64);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = LedgerConfig::from_lookup(lookup_from(&[
            (ENV_MAX_MESSAGE_LEN, "lots"),
            (ENV_LOG_FORMAT, "xml"),
        ]));
        assert_eq!(config, LedgerConfig::default());
    }

    #[test]
    fn deserializes_partial_json() {
        let config: LedgerConfig = serde_json::from_str(r#"{"max_message_len": 16}"#).unwrap();
        assert_eq!(config.max_message_len, 16);
        assert_eq!(config.log_format, LogFormat::Json);
    }
}

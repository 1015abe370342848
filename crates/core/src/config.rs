use std::env;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has invalid value {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Rendering configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Qualify property names with their table in text output.
    pub qualify_properties: bool,
    /// `action` attribute written on every item node of the wire document.
    pub default_action: String,
    /// Indent the wire document when written as XML.
    pub pretty: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            qualify_properties: true,
            default_action: "get".to_string(),
            pretty: false,
        }
    }
}

impl QueryConfig {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            qualify_properties: match lookup("ITEMQL_QUALIFY_PROPERTIES") {
                Some(value) => parse_bool("ITEMQL_QUALIFY_PROPERTIES", value)?,
                None => defaults.qualify_properties,
            },
            default_action: lookup("ITEMQL_DEFAULT_ACTION")
                .filter(|action| !action.trim().is_empty())
                .unwrap_or(defaults.default_action),
            pretty: match lookup("ITEMQL_PRETTY") {
                Some(value) => parse_bool("ITEMQL_PRETTY", value)?,
                None => defaults.pretty,
            },
        })
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = QueryConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, QueryConfig::default());
        assert!(config.qualify_properties);
        assert_eq!(config.default_action, "get");
    }

    #[test]
    fn reads_overrides() {
        let config = QueryConfig::from_lookup(lookup(&[
            ("ITEMQL_QUALIFY_PROPERTIES", "false"),
            ("ITEMQL_DEFAULT_ACTION", "get_latest"),
            ("ITEMQL_PRETTY", "YES"),
        ]))
        .unwrap();
        assert!(!config.qualify_properties);
        assert_eq!(config.default_action, "get_latest");
        assert!(config.pretty);
    }

    #[test]
    fn rejects_malformed_bool() {
        let err = QueryConfig::from_lookup(lookup(&[("ITEMQL_PRETTY", "maybe")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                var: "ITEMQL_PRETTY",
                value: "maybe".into()
            }
        );
    }

    #[test]
    fn deserializes_partial_json() {
        let config: QueryConfig = serde_json::from_value(serde_json::json!({"pretty": true})).unwrap();
        assert!(config.pretty);
        assert_eq!(config.default_action, "get");
    }
}

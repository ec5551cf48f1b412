use serde::{Deserialize, Serialize};

const FETCH_SIZE_ENV: &str = "ODBC_ROWSET_FETCH_SIZE";
const COLLECT_WARNINGS_ENV: &str = "ODBC_ROWSET_COLLECT_WARNINGS";
const MAX_WARNINGS_ENV: &str = "ODBC_ROWSET_MAX_WARNINGS";
const GETDATA_CHUNK_ENV: &str = "ODBC_ROWSET_GETDATA_CHUNK";
const PUTDATA_CHUNK_ENV: &str = "ODBC_ROWSET_PUTDATA_CHUNK";
const LOGGING_ENV: &str = "ODBC_ROWSET_LOGGING";

pub const DEFAULT_FETCH_SIZE: usize = 1;
pub const DEFAULT_MAX_WARNINGS: usize = 64;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Tunables a connection hands down to its statements and result sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fetch_size: usize,
    pub collect_warnings: bool,
    pub max_warnings: usize,
    pub getdata_chunk_size: usize,
    pub putdata_chunk_size: usize,
    pub logging_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fetch_size: DEFAULT_FETCH_SIZE,
            collect_warnings: true,
            max_warnings: DEFAULT_MAX_WARNINGS,
            getdata_chunk_size: DEFAULT_CHUNK_SIZE,
            putdata_chunk_size: DEFAULT_CHUNK_SIZE,
            logging_enabled: true,
        }
    }
}

/// Values set explicitly by the caller; anything left `None` falls back to
/// the environment, then to the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub fetch_size: Option<usize>,
    pub collect_warnings: Option<bool>,
    pub max_warnings: Option<usize>,
    pub getdata_chunk_size: Option<usize>,
    pub putdata_chunk_size: Option<usize>,
    pub logging_enabled: Option<bool>,
}

pub(crate) fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_size(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|v| *v > 0)
}

fn read_env<T>(name: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
    std::env::var(name).ok().and_then(|value| parse(&value))
}

impl EngineConfig {
    /// Resolves every field as explicit value, then environment, then default.
    pub fn resolve(overrides: &ConfigOverrides) -> Self {
        let defaults = Self::default();
        Self {
            fetch_size: overrides
                .fetch_size
                .or_else(|| read_env(FETCH_SIZE_ENV, parse_size))
                .unwrap_or(defaults.fetch_size)
                .max(1),
            collect_warnings: overrides
                .collect_warnings
                .or_else(|| read_env(COLLECT_WARNINGS_ENV, parse_bool_flag))
                .unwrap_or(defaults.collect_warnings),
            max_warnings: overrides
                .max_warnings
                .or_else(|| read_env(MAX_WARNINGS_ENV, parse_size))
                .unwrap_or(defaults.max_warnings),
            getdata_chunk_size: overrides
                .getdata_chunk_size
                .or_else(|| read_env(GETDATA_CHUNK_ENV, parse_size))
                .unwrap_or(defaults.getdata_chunk_size)
                .max(1),
            putdata_chunk_size: overrides
                .putdata_chunk_size
                .or_else(|| read_env(PUTDATA_CHUNK_ENV, parse_size))
                .unwrap_or(defaults.putdata_chunk_size)
                .max(1),
            logging_enabled: overrides
                .logging_enabled
                .or_else(|| read_env(LOGGING_ENV, parse_bool_flag))
                .unwrap_or(defaults.logging_enabled),
        }
    }

    pub fn from_env() -> Self {
        Self::resolve(&ConfigOverrides::default())
    }

    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::error::OdbcError::ValidationError(format!("Invalid engine config: {}", e)))
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::error::OdbcError::InternalError(format!("Engine config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            FETCH_SIZE_ENV,
            COLLECT_WARNINGS_ENV,
            MAX_WARNINGS_ENV,
            GETDATA_CHUNK_ENV,
            PUTDATA_CHUNK_ENV,
            LOGGING_ENV,
        ] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_parse_bool_flag() {
        assert_eq!(parse_bool_flag("YES"), Some(true));
        assert_eq!(parse_bool_flag(" on "), Some(true));
        assert_eq!(parse_bool_flag("0"), Some(false));
        assert_eq!(parse_bool_flag("off"), Some(false));
        assert_eq!(parse_bool_flag("maybe"), None);
    }

    #[test]
    #[serial]
    fn test_resolve_defaults() {
        clear_env();
        let config = EngineConfig::from_env();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_warnings, 64);
        assert_eq!(config.putdata_chunk_size, 4096);
    }

    #[test]
    #[serial]
    fn test_env_override_then_explicit_wins() {
        clear_env();
        std::env::set_var(FETCH_SIZE_ENV, "25");
        std::env::set_var(COLLECT_WARNINGS_ENV, "no");
        std::env::set_var(MAX_WARNINGS_ENV, "garbage");

        let from_env = EngineConfig::from_env();
        assert_eq!(from_env.fetch_size, 25);
        assert!(!from_env.collect_warnings);
        assert_eq!(from_env.max_warnings, DEFAULT_MAX_WARNINGS);

        let explicit = EngineConfig::resolve(&ConfigOverrides {
            fetch_size: Some(7),
            ..ConfigOverrides::default()
        });
        assert_eq!(explicit.fetch_size, 7);
        assert!(!explicit.collect_warnings);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_fetch_size_is_one() {
        clear_env();
        let config = EngineConfig::resolve(&ConfigOverrides {
            fetch_size: Some(0),
            ..ConfigOverrides::default()
        });
        assert_eq!(config.fetch_size, 1);
    }

    #[test]
    fn test_json_round_trip_fills_missing_fields() {
        let config = EngineConfig::from_json(r#"{"fetch_size": 10, "logging_enabled": false}"#).unwrap();
        assert_eq!(config.fetch_size, 10);
        assert!(!config.logging_enabled);
        assert_eq!(config.getdata_chunk_size, DEFAULT_CHUNK_SIZE);

        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
        assert!(EngineConfig::from_json("{").is_err());
    }
}

//! Runtime configuration read from the environment (`.env` is loaded by the binaries).

use crate::error::{ChatError, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_DATABASE: &str = "001_sqlite.db";
const DEFAULT_STEP_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Absent keys and models are reported at call time, not at startup.
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: String,
    pub database_path: PathBuf,
    /// Upper bound for any single generation or database call.
    pub step_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            database_path: PathBuf::from(DEFAULT_DATABASE),
            step_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
            busy_timeout: Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            api_key: non_empty("API_KEY").or_else(|| non_empty("GEMINI_API_KEY")),
            model: non_empty("MODEL_NAME"),
            base_url: non_empty("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            database_path: non_empty("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            step_timeout: match non_empty("STEP_TIMEOUT_SECS") {
                Some(raw) => Duration::from_secs(parse_secs("STEP_TIMEOUT_SECS", &raw)?),
                None => defaults.step_timeout,
            },
            busy_timeout: match non_empty("DB_BUSY_TIMEOUT_SECS") {
                Some(raw) => Duration::from_secs(parse_secs("DB_BUSY_TIMEOUT_SECS", &raw)?),
                None => defaults.busy_timeout,
            },
        })
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<u64> {
    match raw.parse::<u64>() {
        Ok(0) => Err(ChatError::InvalidConfig(format!("{} must be greater than zero", key))),
        Ok(secs) => Ok(secs),
        Err(e) => Err(ChatError::InvalidConfig(format!("{}={:?}: {}", key, raw, e))),
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
    fn test_defaults_when_env_is_empty() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.api_key.is_none());
        assert!(config.model.is_none());
        assert_eq!(config.database_path, PathBuf::from(DEFAULT_DATABASE));
        assert_eq!(config.step_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_gemini_key_is_a_fallback() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "g-key"),
            ("MODEL_NAME", "gemini-2.0-flash"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.model.as_deref(), Some("gemini-2.0-flash"));

        let config = AppConfig::from_lookup(lookup(&[("API_KEY", "a"), ("GEMINI_API_KEY", "g")])).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("a"));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let config = AppConfig::from_lookup(lookup(&[("API_KEY", "  "), ("MODEL_NAME", "")])).unwrap();
        assert!(config.api_key.is_none());
        assert!(config.model.is_none());
    }

    #[test]
    fn test_bad_timeout_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("STEP_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig(_)));
        let err = AppConfig::from_lookup(lookup(&[("DB_BUSY_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ChatError::InvalidConfig(_)));
    }
}

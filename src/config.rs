//! Client configuration
//!
//! Read from the environment (a `.env` file is loaded by the binary first).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ChatError;
use crate::memory::HistoryConfig;
use crate::orchestrator::OrchestratorConfig;
use crate::Result;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the dashboard backend
    pub backend_url: String,
    pub orchestrator: OrchestratorConfig,
    /// Where UI preferences live; in-memory only when unset
    pub preferences_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            orchestrator: OrchestratorConfig::default(),
            preferences_path: None,
        }
    }
}

impl ClientConfig {
    /// Build from `BACKEND_URL`, `PROGRESS_TICK_MS`, `HISTORY_MAX_TURNS`
    /// and `PREFERENCES_PATH`, falling back to defaults for unset values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let backend_url = lookup("BACKEND_URL")
            .or_else(|| lookup("API_BASE_URL"))
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.backend_url);

        if !(backend_url.starts_with("http://") || backend_url.starts_with("https://")) {
            return Err(ChatError::Config(format!(
                "BACKEND_URL must be an http(s) URL, got '{}'",
                backend_url
            )));
        }

        let progress_tick = match parse_var::<u64>(&lookup, "PROGRESS_TICK_MS")? {
            Some(0) => {
                return Err(ChatError::Config(
                    "PROGRESS_TICK_MS must be greater than zero".to_string(),
                ))
            }
            Some(ms) => Duration::from_millis(ms),
            None => defaults.orchestrator.progress_tick,
        };

        let history = HistoryConfig {
            max_turns: parse_var(&lookup, "HISTORY_MAX_TURNS")?
                .unwrap_or(defaults.orchestrator.history.max_turns),
            ..defaults.orchestrator.history
        };

        let preferences_path = lookup("PREFERENCES_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            backend_url,
            orchestrator: OrchestratorConfig {
                progress_tick,
                history,
            },
            preferences_path,
        })
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ChatError::Config(format!("{} is not a valid number: '{}'", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ClientConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.orchestrator.progress_tick, Duration::from_millis(1500));
        assert_eq!(config.orchestrator.history.max_turns, 20);
        assert!(config.preferences_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("BACKEND_URL", "https://dash.example.com"),
            ("PROGRESS_TICK_MS", "250"),
            ("HISTORY_MAX_TURNS", "6"),
            ("PREFERENCES_PATH", "/tmp/prefs.json"),
        ])
        .unwrap();

        assert_eq!(config.backend_url, "https://dash.example.com");
        assert_eq!(config.orchestrator.progress_tick, Duration::from_millis(250));
        assert_eq!(config.orchestrator.history.max_turns, 6);
        assert_eq!(config.preferences_path, Some(PathBuf::from("/tmp/prefs.json")));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("PROGRESS_TICK_MS", "fast")]),
            Err(ChatError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("PROGRESS_TICK_MS", "0")]),
            Err(ChatError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("BACKEND_URL", "localhost:8000")]),
            Err(ChatError::Config(_))
        ));
    }
}

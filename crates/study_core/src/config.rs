//! Client configuration loading
//!
//! Reads `config.toml` when present, then applies environment variable
//! overrides. Library code never installs a logging subscriber; the
//! embedding application owns that.

use serde::{Deserialize, Serialize};

const CONFIG_FILE_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the platform gateway.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Timeout for non-streaming requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Cadence of the chat typing drain, in milliseconds.
    #[serde(default = "default_typing_interval_ms")]
    pub typing_interval_ms: u64,
    /// Maximum characters appended per drain step.
    #[serde(default = "default_typing_chunk_chars")]
    pub typing_chunk_chars: usize,
}

fn default_api_base() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_typing_interval_ms() -> u64 {
    16
}

fn default_typing_chunk_chars() -> usize {
    3
}

fn parse_u64_env(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            typing_interval_ms: default_typing_interval_ms(),
            typing_chunk_chars: default_typing_chunk_chars(),
        }
    }
}

impl Config {
    /// Load configuration: `config.toml` if it exists, then environment
    /// variable overrides.
    pub fn new() -> Self {
        let mut config = Config::default();

        if std::path::Path::new(CONFIG_FILE_PATH).exists() {
            if let Ok(content) = std::fs::read_to_string(CONFIG_FILE_PATH) {
                if let Ok(file_config) = toml::from_str::<Config>(&content) {
                    config = file_config;
                }
            }
        }

        if let Ok(api_base) = std::env::var("STUDY_API_BASE") {
            config.api_base = api_base;
        }
        if let Some(secs) = std::env::var("STUDY_REQUEST_TIMEOUT_SECS")
            .ok()
            .as_deref()
            .and_then(parse_u64_env)
        {
            config.request_timeout_secs = secs;
        }
        if let Some(ms) = std::env::var("STUDY_TYPING_INTERVAL_MS")
            .ok()
            .as_deref()
            .and_then(parse_u64_env)
        {
            config.typing_interval_ms = ms;
        }
        if let Some(chars) = std::env::var("STUDY_TYPING_CHUNK_CHARS")
            .ok()
            .as_deref()
            .and_then(parse_u64_env)
        {
            config.typing_chunk_chars = chars as usize;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.api_base, "http://localhost:8080");
        assert_eq!(config.typing_chunk_chars, 3);
        assert!(config.typing_interval_ms > 0);
    }

    #[test]
    fn parse_u64_env_values() {
        assert_eq!(parse_u64_env(" 25 "), Some(25));
        assert_eq!(parse_u64_env("abc"), None);
        assert_eq!(parse_u64_env(""), None);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str("api_base = \"https://api.example.test\"").unwrap();
        assert_eq!(config.api_base, "https://api.example.test");
        assert_eq!(config.request_timeout_secs, 30);
    }
}

//! Configuration file parser for ~/.config/newswire/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as warnings since they are usually
//! typos. Environment variables override the file, and the binary's CLI flags
//! override both.
use crate::connection::DEFAULT_RECONNECT_DELAY;
use crate::feed::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_SNAPSHOT_LIMIT, FEED_CAPACITY};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Overrides `ws_endpoint`.
pub const ENV_WS_ENDPOINT: &str = "NEWSWIRE_WS_ENDPOINT";
/// Overrides `api_endpoint`.
pub const ENV_API_ENDPOINT: &str = "NEWSWIRE_API_ENDPOINT";

pub const DEFAULT_WS_ENDPOINT: &str = "wss://your-api-id.execute-api.us-east-1.amazonaws.com/prod";
pub const DEFAULT_API_ENDPOINT: &str =
    "https://your-api-id.execute-api.us-east-1.amazonaws.com/prod";

const MIN_RECONNECT_DELAY_MS: u64 = 100;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level client configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Push endpoint (`ws://` or `wss://`).
    pub ws_endpoint: String,

    /// Base URL of the REST API; the snapshot is `GET {api_endpoint}/news`.
    pub api_endpoint: String,

    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay_ms: u64,

    /// Number of articles requested by the startup snapshot.
    pub snapshot_limit: u32,

    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = [
        "ws_endpoint",
        "api_endpoint",
        "reconnect_delay_ms",
        "snapshot_limit",
        "request_timeout_secs",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            ws_endpoint = %config.ws_endpoint,
            api_endpoint = %config.api_endpoint,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Applies `NEWSWIRE_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides using `lookup` in place of the process environment.
    /// Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(ws) = non_empty(ENV_WS_ENDPOINT) {
            tracing::debug!(var = ENV_WS_ENDPOINT, "Push endpoint overridden from environment");
            self.ws_endpoint = ws;
        }
        if let Some(api) = non_empty(ENV_API_ENDPOINT) {
            tracing::debug!(var = ENV_API_ENDPOINT, "API endpoint overridden from environment");
            self.api_endpoint = api;
        }
    }

    /// Reconnect delay, floored at 100ms so a zero in the file cannot
    /// produce a busy reconnect loop.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.max(MIN_RECONNECT_DELAY_MS))
    }

    /// Snapshot limit clamped to `1..=FEED_CAPACITY`.
    pub fn snapshot_limit(&self) -> u32 {
        self.snapshot_limit.clamp(1, FEED_CAPACITY as u32)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn write_config(name: &str, content: &str) -> (std::path::PathBuf, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("newswire_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ws_endpoint, DEFAULT_WS_ENDPOINT);
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.reconnect_delay(), Duration::from_millis(3000));
        assert_eq!(config.snapshot_limit(), 50);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/newswire_test_nonexistent_config.toml");
        assert_eq!(Config::load(path).unwrap(), Config::default());
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = write_config("whitespace", "   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (dir, path) = write_config("partial", "ws_endpoint = \"ws://localhost:9000\"\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ws_endpoint, "ws://localhost:9000");
        assert_eq!(config.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(config.reconnect_delay_ms, 3000);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let content = r#"
ws_endpoint = "wss://push.example.com/dev"
api_endpoint = "https://api.example.com/dev"
reconnect_delay_ms = 1500
snapshot_limit = 20
request_timeout_secs = 10
"#;
        let (dir, path) = write_config("full", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.ws_endpoint, "wss://push.example.com/dev");
        assert_eq!(config.api_endpoint, "https://api.example.com/dev");
        assert_eq!(config.reconnect_delay(), Duration::from_millis(1500));
        assert_eq!(config.snapshot_limit(), 20);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = write_config("invalid", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = write_config("unknown", "theme = \"dark\"\nsnapshot_limit = 10\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.snapshot_limit, 10);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (dir, path) = write_config("wrongtype", "reconnect_delay_ms = \"soon\"\n");
        assert!(Config::load(&path).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = write_config("too_large", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_overrides_endpoints() {
        let env: HashMap<&str, &str> = [
            (ENV_WS_ENDPOINT, "ws://127.0.0.1:4000"),
            (ENV_API_ENDPOINT, "http://127.0.0.1:4001/stage"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.ws_endpoint, "ws://127.0.0.1:4000");
        assert_eq!(config.api_endpoint, "http://127.0.0.1:4001/stage");
    }

    #[test]
    fn test_empty_env_value_ignored() {
        let mut config = Config::default();
        config.apply_env_from(|key| (key == ENV_WS_ENDPOINT).then(|| "  ".to_string()));
        assert_eq!(config.ws_endpoint, DEFAULT_WS_ENDPOINT);
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let config = Config {
            reconnect_delay_ms: 0,
            snapshot_limit: 5000,
            request_timeout_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.reconnect_delay(), Duration::from_millis(100));
        assert_eq!(config.snapshot_limit(), 100);
        assert_eq!(config.request_timeout(), Duration::from_secs(1));

        let zero_limit = Config {
            snapshot_limit: 0,
            ..Config::default()
        };
        assert_eq!(zero_limit.snapshot_limit(), 1);
    }
}

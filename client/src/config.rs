//! Configuration module for the tasksync client.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TASKSYNC_STORE_URL` | Yes | - | Store base URL (e.g., `http://localhost:5200`) |
//! | `TASKSYNC_NOTIFY_URL` | No | store URL as `ws(s)://…/ws` | Notification WebSocket URL |
//! | `TASKSYNC_CHANNEL` | No | `todo` | Notification channel name |
//! | `TASKSYNC_REQUEST_TIMEOUT_SECS` | No | 30 | Per-request timeout |
//! | `TASKSYNC_ECHO_MODE` | No | `correlated` | `correlated` or `single-slot` |
//! | `TASKSYNC_COMPLETE_FAILURE` | No | `surface` | `surface` or `silent` |
//!
//! # Example
//!
//! ```no_run
//! use tasksync_client::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Store URL: {}", config.store_url);
//! ```

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default notification channel name.
pub const DEFAULT_CHANNEL: &str = "todo";

/// Default per-request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Path of the notification endpoint when derived from the store URL.
const DEFAULT_NOTIFY_PATH: &str = "/ws";

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// How self-originated notification echoes are recognized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EchoMode {
    /// One outstanding-echo flag: the first notification after a local
    /// mutation is assumed to be its echo. Works with stores that do not
    /// echo client tokens, but misattributes interleaved foreign events.
    SingleSlot,
    /// Each mutation carries a client token that the store echoes back.
    /// Needs a store that copies `clientToken` into its broadcasts.
    #[default]
    Correlated,
}

impl FromStr for EchoMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single-slot" | "single" => Ok(Self::SingleSlot),
            "correlated" => Ok(Self::Correlated),
            other => Err(format!(
                "expected 'single-slot' or 'correlated', got '{other}'"
            )),
        }
    }
}

impl fmt::Display for EchoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SingleSlot => f.write_str("single-slot"),
            Self::Correlated => f.write_str("correlated"),
        }
    }
}

/// What to do when a completion request fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionFailurePolicy {
    /// Show the error through the notifier.
    #[default]
    Surface,
    /// Only log it.
    Silent,
}

impl FromStr for CompletionFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "surface" => Ok(Self::Surface),
            "silent" => Ok(Self::Silent),
            other => Err(format!("expected 'surface' or 'silent', got '{other}'")),
        }
    }
}

/// Configuration for the tasksync client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Store base URL without a trailing slash.
    pub store_url: String,

    /// WebSocket URL of the notification channel.
    pub notify_url: String,

    /// Channel to subscribe to.
    pub channel: String,

    /// Timeout applied to every store request.
    pub request_timeout: Duration,

    /// Echo recognition strategy.
    pub echo_mode: EchoMode,

    /// Completion failure handling.
    pub completion_failure: CompletionFailurePolicy,
}

impl Config {
    /// Creates a configuration for `store_url` with every other field at its
    /// default.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the notification URL cannot be
    /// derived from `store_url`.
    pub fn new(store_url: impl Into<String>) -> Result<Self, ConfigError> {
        let store_url = normalize_base_url(&store_url.into());
        let notify_url = derive_notify_url(&store_url)?;
        Ok(Self::with_urls(store_url, notify_url))
    }

    /// Creates a configuration with explicit store and notification URLs.
    #[must_use]
    pub fn with_urls(store_url: impl Into<String>, notify_url: impl Into<String>) -> Self {
        Self {
            store_url: normalize_base_url(&store_url.into()),
            notify_url: notify_url.into(),
            channel: DEFAULT_CHANNEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            echo_mode: EchoMode::default(),
            completion_failure: CompletionFailurePolicy::default(),
        }
    }

    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `TASKSYNC_STORE_URL` is not set
    /// - the notification URL is neither set nor derivable from the store URL
    /// - any optional variable is set to an unparseable value
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: TASKSYNC_STORE_URL
        let store_url = env::var("TASKSYNC_STORE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("TASKSYNC_STORE_URL".to_string()))?;

        let store_url = normalize_base_url(&store_url);

        // Optional: TASKSYNC_NOTIFY_URL (default: derived from the store URL)
        let notify_url = match env::var("TASKSYNC_NOTIFY_URL") {
            Ok(url) => url,
            Err(_) => derive_notify_url(&store_url)?,
        };

        let mut config = Self::with_urls(store_url, notify_url);

        if let Ok(channel) = env::var("TASKSYNC_CHANNEL") {
            let channel = channel.trim().to_string();
            if channel.is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "TASKSYNC_CHANNEL".to_string(),
                    message: "channel name cannot be empty".to_string(),
                });
            }
            config.channel = channel;
        }

        // Optional: TASKSYNC_REQUEST_TIMEOUT_SECS (default: 30, must be > 0)
        if let Ok(val) = env::var("TASKSYNC_REQUEST_TIMEOUT_SECS") {
            let secs = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "TASKSYNC_REQUEST_TIMEOUT_SECS".to_string(),
                message: format!("expected positive integer, got '{val}'"),
            })?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "TASKSYNC_REQUEST_TIMEOUT_SECS".to_string(),
                    message: "timeout must be at least 1 second".to_string(),
                });
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = env::var("TASKSYNC_ECHO_MODE") {
            config.echo_mode = val.parse().map_err(|message| ConfigError::InvalidValue {
                key: "TASKSYNC_ECHO_MODE".to_string(),
                message,
            })?;
        }

        if let Ok(val) = env::var("TASKSYNC_COMPLETE_FAILURE") {
            config.completion_failure =
                val.parse().map_err(|message| ConfigError::InvalidValue {
                    key: "TASKSYNC_COMPLETE_FAILURE".to_string(),
                    message,
                })?;
        }

        Ok(config)
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Maps `http(s)://host[:port]` to `ws(s)://host[:port]/ws`.
fn derive_notify_url(store_url: &str) -> Result<String, ConfigError> {
    let ws_base = if let Some(rest) = store_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = store_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(ConfigError::InvalidValue {
            key: "TASKSYNC_STORE_URL".to_string(),
            message: format!(
                "expected an http:// or https:// URL, got '{store_url}' \
                 (set TASKSYNC_NOTIFY_URL to skip derivation)"
            ),
        });
    };

    Ok(format!("{ws_base}{DEFAULT_NOTIFY_PATH}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to run tests with isolated environment variables.
    /// Clears all TASKSYNC_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> = env::vars()
            .filter(|(k, _)| k.starts_with("TASKSYNC_"))
            .collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, _) in env::vars().filter(|(k, _)| k.starts_with("TASKSYNC_")) {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    #[serial]
    fn test_missing_store_url() {
        with_clean_env(|| {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::MissingEnvVar(ref s) if s == "TASKSYNC_STORE_URL"));
        });
    }

    #[test]
    #[serial]
    fn test_minimal_config() {
        with_clean_env(|| {
            env::set_var("TASKSYNC_STORE_URL", "http://localhost:5200/");

            let config = Config::from_env().expect("should parse minimal config");

            assert_eq!(config.store_url, "http://localhost:5200");
            assert_eq!(config.notify_url, "ws://localhost:5200/ws");
            assert_eq!(config.channel, DEFAULT_CHANNEL);
            assert_eq!(
                config.request_timeout,
                Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
            );
            assert_eq!(config.echo_mode, EchoMode::Correlated);
            assert_eq!(config.completion_failure, CompletionFailurePolicy::Surface);
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("TASKSYNC_STORE_URL", "https://tasks.example.com");
            env::set_var("TASKSYNC_NOTIFY_URL", "wss://push.example.com/app");
            env::set_var("TASKSYNC_CHANNEL", "groceries");
            env::set_var("TASKSYNC_REQUEST_TIMEOUT_SECS", "5");
            env::set_var("TASKSYNC_ECHO_MODE", "single-slot");
            env::set_var("TASKSYNC_COMPLETE_FAILURE", "silent");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.store_url, "https://tasks.example.com");
            assert_eq!(config.notify_url, "wss://push.example.com/app");
            assert_eq!(config.channel, "groceries");
            assert_eq!(config.request_timeout, Duration::from_secs(5));
            assert_eq!(config.echo_mode, EchoMode::SingleSlot);
            assert_eq!(config.completion_failure, CompletionFailurePolicy::Silent);
        });
    }

    #[test]
    #[serial]
    fn test_https_store_derives_wss() {
        with_clean_env(|| {
            env::set_var("TASKSYNC_STORE_URL", "https://tasks.example.com");

            let config = Config::from_env().unwrap();
            assert_eq!(config.notify_url, "wss://tasks.example.com/ws");
        });
    }

    #[test]
    #[serial]
    fn test_non_http_store_needs_explicit_notify_url() {
        with_clean_env(|| {
            env::set_var("TASKSYNC_STORE_URL", "unix:///tmp/store.sock");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TASKSYNC_STORE_URL"));

            env::set_var("TASKSYNC_NOTIFY_URL", "ws://localhost:9000/ws");
            let config = Config::from_env().unwrap();
            assert_eq!(config.notify_url, "ws://localhost:9000/ws");
        });
    }

    #[test]
    #[serial]
    fn test_invalid_timeout() {
        with_clean_env(|| {
            env::set_var("TASKSYNC_STORE_URL", "http://localhost:5200");
            env::set_var("TASKSYNC_REQUEST_TIMEOUT_SECS", "soon");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TASKSYNC_REQUEST_TIMEOUT_SECS"));
        });
    }

    #[test]
    #[serial]
    fn test_zero_timeout_rejected() {
        with_clean_env(|| {
            env::set_var("TASKSYNC_STORE_URL", "http://localhost:5200");
            env::set_var("TASKSYNC_REQUEST_TIMEOUT_SECS", "0");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref message, .. } if message.contains("at least 1")));
        });
    }

    #[test]
    #[serial]
    fn test_invalid_echo_mode() {
        with_clean_env(|| {
            env::set_var("TASKSYNC_STORE_URL", "http://localhost:5200");
            env::set_var("TASKSYNC_ECHO_MODE", "counter");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TASKSYNC_ECHO_MODE"));
        });
    }

    #[test]
    #[serial]
    fn test_empty_channel_rejected() {
        with_clean_env(|| {
            env::set_var("TASKSYNC_STORE_URL", "http://localhost:5200");
            env::set_var("TASKSYNC_CHANNEL", "  ");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TASKSYNC_CHANNEL"));
        });
    }

    #[test]
    fn echo_mode_parses_case_insensitively() {
        assert_eq!("Correlated".parse::<EchoMode>(), Ok(EchoMode::Correlated));
        assert_eq!("single".parse::<EchoMode>(), Ok(EchoMode::SingleSlot));
        assert_eq!(EchoMode::Correlated.to_string(), "correlated");
    }

    #[test]
    fn config_new_uses_defaults() {
        let config = Config::new("http://127.0.0.1:8080").unwrap();
        assert_eq!(config.notify_url, "ws://127.0.0.1:8080/ws");
        assert_eq!(config.channel, "todo");
        assert_eq!(config.echo_mode, EchoMode::Correlated);
    }
}

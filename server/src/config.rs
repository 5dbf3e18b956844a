//! Server configuration module.
//!
//! Parses configuration from environment variables for the tasksync server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PORT` | No | 5200 | HTTP server port |
//! | `TASKSYNC_CHANNEL` | No | `todo` | Channel name used for broadcasts |

use std::env;

use thiserror::Error;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 5200;

/// Default broadcast channel.
pub const DEFAULT_CHANNEL: &str = "todo";

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Channel name stamped on every broadcast frame.
    pub channel: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `PORT` is not a valid u16 or
    /// `TASKSYNC_CHANNEL` is blank.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tasksync_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_port()?;
        let channel = parse_channel()?;
        Ok(Self { port, channel })
    }
}

fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(value) => Ok(value.trim().parse()?),
        Err(_) => Ok(DEFAULT_PORT),
    }
}

fn parse_channel() -> Result<String, ConfigError> {
    match env::var("TASKSYNC_CHANNEL") {
        Ok(value) => {
            let channel = value.trim();
            if channel.is_empty() {
                return Err(ConfigError::InvalidFormat {
                    var: "TASKSYNC_CHANNEL".to_string(),
                    message: "channel name cannot be empty".to_string(),
                });
            }
            Ok(channel.to_string())
        }
        Err(_) => Ok(DEFAULT_CHANNEL.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 2] = ["PORT", "TASKSYNC_CHANNEL"];

    /// Runs `f` with the server's variables cleared, restoring them after.
    fn with_clean_env<F: FnOnce()>(f: F) {
        let saved: Vec<(&str, Option<String>)> =
            VARS.iter().map(|var| (*var, env::var(var).ok())).collect();
        for var in VARS {
            env::remove_var(var);
        }

        f();

        for (var, value) in saved {
            match value {
                Some(value) => env::set_var(var, value),
                None => env::remove_var(var),
            }
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        with_clean_env(|| {
            let config = Config::from_env().unwrap();
            assert_eq!(config, Config::default());
            assert_eq!(config.port, 5200);
            assert_eq!(config.channel, "todo");
        });
    }

    #[test]
    #[serial]
    fn test_custom_values() {
        with_clean_env(|| {
            env::set_var("PORT", "9000");
            env::set_var("TASKSYNC_CHANNEL", "chores");

            let config = Config::from_env().unwrap();
            assert_eq!(config.port, 9000);
            assert_eq!(config.channel, "chores");
        });
    }

    #[test]
    #[serial]
    fn test_invalid_port() {
        with_clean_env(|| {
            env::set_var("PORT", "not-a-port");
            assert!(matches!(
                Config::from_env(),
                Err(ConfigError::InvalidPort(_))
            ));

            env::set_var("PORT", "70000");
            assert!(matches!(
                Config::from_env(),
                Err(ConfigError::InvalidPort(_))
            ));
        });
    }

    #[test]
    #[serial]
    fn test_blank_channel() {
        with_clean_env(|| {
            env::set_var("TASKSYNC_CHANNEL", "   ");
            assert!(matches!(
                Config::from_env(),
                Err(ConfigError::InvalidFormat { ref var, .. }) if var == "TASKSYNC_CHANNEL"
            ));
        });
    }
}

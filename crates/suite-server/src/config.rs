//! Host configuration.
//!
//! Loaded from environment variables with defaults suitable for local use.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use suite_auth::MAX_LIFETIME_SECS;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Host server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name reported in logs.
    pub name: String,

    /// Seconds between expired-session sweeps.
    pub sweep_interval_secs: u64,

    /// Base URL of the service used to validate API keys.
    pub api_key_probe_url: Option<String>,

    /// Timeout for key probe requests in seconds.
    pub probe_timeout_secs: u64,

    /// Lifetime of API-key sessions created without an explicit `expires_in`.
    pub session_ttl_secs: Option<i64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "mcp-suite".to_string(),
            sweep_interval_secs: 300,
            api_key_probe_url: None,
            probe_timeout_secs: 10,
            session_ttl_secs: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MCP_SERVER_NAME`: server name (default: mcp-suite)
    /// - `MCP_SESSION_SWEEP_SECS`: sweep interval in seconds (default: 300)
    /// - `MCP_API_KEY_PROBE_URL`: key probe base URL (default: none, keys are not checked)
    /// - `MCP_API_KEY_PROBE_TIMEOUT_SECS`: key probe timeout in seconds (default: 10)
    /// - `MCP_SESSION_TTL_SECS`: default API-key session lifetime (default: never expires)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let config = Self {
            name: lookup("MCP_SERVER_NAME")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(default.name),
            sweep_interval_secs: parse_var(&lookup, "MCP_SESSION_SWEEP_SECS")?
                .unwrap_or(default.sweep_interval_secs),
            api_key_probe_url: lookup("MCP_API_KEY_PROBE_URL").filter(|s| !s.trim().is_empty()),
            probe_timeout_secs: parse_var(&lookup, "MCP_API_KEY_PROBE_TIMEOUT_SECS")?
                .unwrap_or(default.probe_timeout_secs),
            session_ttl_secs: parse_var(&lookup, "MCP_SESSION_TTL_SECS")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MCP_SESSION_SWEEP_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some(ttl) = self.session_ttl_secs {
            if !(1..=MAX_LIFETIME_SECS).contains(&ttl) {
                return Err(ConfigError::InvalidValue {
                    key: "MCP_SESSION_TTL_SECS".to_string(),
                    message: format!("must be between 1 and {}", MAX_LIFETIME_SECS),
                });
            }
        }
        if let Some(url) = &self.api_key_probe_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    key: "MCP_API_KEY_PROBE_URL".to_string(),
                    message: format!("not an http(s) URL: {}", url),
                });
            }
        }
        Ok(())
    }

    /// Sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Key probe timeout as a Duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.sweep_interval(), Duration::from_secs(300));
        assert!(config.api_key_probe_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MCP_SERVER_NAME", "docs"),
            ("MCP_SESSION_SWEEP_SECS", "60"),
            ("MCP_API_KEY_PROBE_URL", "https://wiki.example.com"),
            ("MCP_SESSION_TTL_SECS", " 3600 "),
        ])
        .unwrap();

        assert_eq!(config.name, "docs");
        assert_eq!(config.sweep_interval_secs, 60);
        assert_eq!(
            config.api_key_probe_url.as_deref(),
            Some("https://wiki.example.com")
        );
        assert_eq!(config.session_ttl_secs, Some(3600));
    }

    #[test]
    fn test_invalid_values() {
        let err = load(&[("MCP_SESSION_SWEEP_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "MCP_SESSION_SWEEP_SECS"));

        assert!(load(&[("MCP_SESSION_SWEEP_SECS", "0")]).is_err());
        assert!(load(&[("MCP_SESSION_TTL_SECS", "-5")]).is_err());
        assert!(load(&[("MCP_SESSION_TTL_SECS", "0")]).is_err());
        assert!(load(&[("MCP_SESSION_TTL_SECS", "10000000000000")]).is_err());
        assert!(load(&[("MCP_SESSION_TTL_SECS", "9223372036854775807")]).is_err());
        assert!(load(&[("MCP_SESSION_TTL_SECS", "315360000")]).is_ok());
        assert!(load(&[("MCP_API_KEY_PROBE_URL", "wiki.local")]).is_err());
    }
}

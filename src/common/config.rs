//! Configuration management for the pointdesk service
//!
//! This module provides a centralized configuration system with validation,
//! defaults, and environment variable support.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiSettings,
    pub settlement: SettlementSettings,
    pub teams: TeamCacheSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlementSettings {
    /// Upper bound on games processed per run; protects against runaway
    /// batches when candidates pile up.
    pub max_games_per_run: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamCacheSettings {
    /// Seconds before the team alias table is considered stale.
    pub ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            settlement: SettlementSettings::default(),
            teams: TeamCacheSettings::default(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

impl Default for SettlementSettings {
    fn default() -> Self {
        Self {
            max_games_per_run: 200,
        }
    }
}

impl Default for TeamCacheSettings {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            AppConfig::default()
        };

        // Override with environment variables
        self.apply_env_overrides(&mut config)?;

        // Validate the final configuration
        self.validate(&config)?;

        Ok(config)
    }

    /// Load configuration from TOML file
    fn load_from_file(&self, path: &str) -> Result<AppConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::validation(format!("failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::validation(format!("failed to parse {}: {}", path, e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut AppConfig) -> Result<()> {
        if let Ok(host) = env::var("POINTDESK_API_HOST") {
            config.api.host = host;
        }
        if let Ok(port) = env::var("POINTDESK_API_PORT") {
            config.api.port = port.parse().map_err(|_| {
                Error::validation(format!("POINTDESK_API_PORT: '{}' is not a port number", port))
            })?;
        }
        if let Ok(timeout) = env::var("POINTDESK_REQUEST_TIMEOUT_SECS") {
            config.api.request_timeout_secs = timeout.parse().map_err(|_| {
                Error::validation(format!(
                    "POINTDESK_REQUEST_TIMEOUT_SECS: '{}' is not a number of seconds",
                    timeout
                ))
            })?;
        }
        if let Ok(ttl) = env::var("POINTDESK_TEAM_CACHE_TTL_SECS") {
            config.teams.ttl_secs = ttl.parse().map_err(|_| {
                Error::validation(format!(
                    "POINTDESK_TEAM_CACHE_TTL_SECS: '{}' is not a number of seconds",
                    ttl
                ))
            })?;
        }

        Ok(())
    }

    /// Validate configuration values
    fn validate(&self, config: &AppConfig) -> Result<()> {
        if config.api.port == 0 {
            return Err(Error::validation("api.port cannot be zero"));
        }
        if config.api.request_timeout_secs == 0 {
            return Err(Error::validation("api.request_timeout_secs cannot be zero"));
        }
        if config.settlement.max_games_per_run == 0 {
            return Err(Error::validation("settlement.max_games_per_run cannot be zero"));
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.teams.ttl_secs, 3600);
    }

    #[test]
    fn test_config_validation() {
        let loader = ConfigLoader::new();
        let mut config = AppConfig::default();

        // Valid config should pass
        assert!(loader.validate(&config).is_ok());

        // Invalid port should fail
        config.api.port = 0;
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str("[api]\nport = 9000\n").unwrap();
        assert_eq!(config.api.port, 9000);
        assert_eq!(config.api.host, "0.0.0.0");
        assert_eq!(config.settlement.max_games_per_run, 200);
    }
}

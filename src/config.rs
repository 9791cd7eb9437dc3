//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct,
//! then splits it into the smaller objects each component is constructed with.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `PROVIDER_BASE_URL` (required): base URL of the vending gateway
/// - `PROVIDER_API_KEY` (required): static credential sent to the gateway
/// - `PROVIDER_TIMEOUT_SECS` (optional): bounded provider wait, defaults to 45
/// - `PROVIDER_ACCEPT_PENDING` (optional): settle "pending" provider replies as success, defaults to true
/// - `RECOVERY_STALE_AFTER_SECS` (optional): age of an abandoned PENDING attempt, defaults to 300;
///   must be at least `PROVIDER_TIMEOUT_SECS` + 30
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub provider_base_url: String,

    pub provider_api_key: String,

    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,

    #[serde(default = "default_accept_pending")]
    pub provider_accept_pending: bool,

    #[serde(default = "default_recovery_stale_after_secs")]
    pub recovery_stale_after_secs: u64,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_provider_timeout_secs() -> u64 {
    45
}

fn default_accept_pending() -> bool {
    true
}

fn default_recovery_stale_after_secs() -> u64 {
    300
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: provider_api_key -> PROVIDER_API_KEY
        envy::from_env::<Config>()
    }

    /// Connection settings for the vending gateway client.
    pub fn provider(&self) -> Result<ProviderConfig, url::ParseError> {
        Ok(ProviderConfig {
            base_url: url::Url::parse(&self.provider_base_url)?,
            api_key: self.provider_api_key.clone(),
            timeout: Duration::from_secs(self.provider_timeout_secs),
        })
    }

    /// Settlement rules handed to the vend orchestrator.
    pub fn settlement_policy(&self) -> SettlementPolicy {
        SettlementPolicy {
            provider_timeout: Duration::from_secs(self.provider_timeout_secs),
            accept_pending: self.provider_accept_pending,
        }
    }

    /// How old a PENDING transaction must be before start-up recovery refunds it.
    ///
    /// # Errors
    ///
    /// The threshold must exceed the provider timeout by at least
    /// [`RECOVERY_MARGIN`]. Otherwise a freshly started instance could refund an
    /// attempt another instance is still waiting on.
    pub fn recovery_stale_after(&self) -> Result<Duration, ConfigError> {
        let stale_after = Duration::from_secs(self.recovery_stale_after_secs);
        let minimum = Duration::from_secs(self.provider_timeout_secs) + RECOVERY_MARGIN;

        if stale_after < minimum {
            return Err(ConfigError::RecoveryThresholdTooShort {
                stale_after_secs: self.recovery_stale_after_secs,
                minimum_secs: minimum.as_secs(),
            });
        }

        Ok(stale_after)
    }
}

/// Slack between the provider timeout and the recovery threshold.
pub const RECOVERY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "RECOVERY_STALE_AFTER_SECS is {stale_after_secs}, must be at least {minimum_secs} \
         (PROVIDER_TIMEOUT_SECS plus a 30 second margin)"
    )]
    RecoveryThresholdTooShort {
        stale_after_secs: u64,
        minimum_secs: u64,
    },
}

/// Vending gateway connection settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: url::Url,
    pub api_key: String,
    pub timeout: Duration,
}

/// Rules the orchestrator applies when settling an attempt.
#[derive(Debug, Clone)]
pub struct SettlementPolicy {
    /// Upper bound on a single provider call, including task scheduling.
    pub provider_timeout: Duration,

    /// Treat a provider "accepted, pending" reply as a successful vend.
    pub accept_pending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            database_url: "postgres://localhost/vend".to_string(),
            server_port: 3000,
            provider_base_url: "https://gateway.example.com/api/".to_string(),
            provider_api_key: "secret".to_string(),
            provider_timeout_secs: 45,
            provider_accept_pending: true,
            recovery_stale_after_secs: 300,
        }
    }

    #[test]
    fn test_provider_config_parses_base_url() {
        let provider = sample().provider().unwrap();
        assert_eq!(provider.base_url.host_str(), Some("gateway.example.com"));
        assert_eq!(provider.timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_provider_config_rejects_invalid_url() {
        let mut config = sample();
        config.provider_base_url = "not a url".to_string();
        assert!(config.provider().is_err());
    }

    #[test]
    fn test_settlement_policy_follows_config() {
        let mut config = sample();
        config.provider_accept_pending = false;
        config.provider_timeout_secs = 10;

        let policy = config.settlement_policy();
        assert!(!policy.accept_pending);
        assert_eq!(policy.provider_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_recovery_threshold_must_outlast_provider_timeout() {
        let mut config = sample();
        assert_eq!(config.recovery_stale_after().unwrap(), Duration::from_secs(300));

        config.recovery_stale_after_secs = 30;
        assert!(matches!(
            config.recovery_stale_after(),
            Err(ConfigError::RecoveryThresholdTooShort { minimum_secs: 75, .. })
        ));

        // Equal to the timeout is still inside a live attempt's window.
        config.recovery_stale_after_secs = 45;
        assert!(config.recovery_stale_after().is_err());

        config.recovery_stale_after_secs = 75;
        assert_eq!(config.recovery_stale_after().unwrap(), Duration::from_secs(75));
    }
}

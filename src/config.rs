//! Configuration management for the gateway
//!
//! Configuration is loaded from environment variables.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Credential used when a request carries none
    pub default_credential: Option<String>,

    /// Path of the Copilot CLI executable
    pub cli_path: String,
    /// Log level passed to the Copilot CLI
    pub cli_log_level: String,

    /// Upper bound on one assistant turn
    pub request_timeout: Duration,
    /// Upper bound on draining in-flight requests at shutdown
    pub drain_timeout: Duration,
    /// Upper bound on stopping backend clients at shutdown
    pub shutdown_timeout: Duration,

    /// Install the Prometheus recorder
    pub metrics_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            default_credential: None,
            cli_path: "copilot".to_string(),
            cli_log_level: "error".to_string(),
            request_timeout: Duration::from_secs(300),
            drain_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(3),
            metrics_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            host: env::var("GATEWAY_HOST").unwrap_or(defaults.host),
            port: env::var("GATEWAY_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid GATEWAY_PORT")?,

            default_credential: env::var("GH_TOKEN").ok().filter(|t| !t.trim().is_empty()),

            cli_path: env::var("COPILOT_CLI_PATH").unwrap_or(defaults.cli_path),
            cli_log_level: env::var("COPILOT_LOG_LEVEL").unwrap_or(defaults.cli_log_level),

            request_timeout: Duration::from_secs(
                env::var("GATEWAY_REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .context("Invalid GATEWAY_REQUEST_TIMEOUT_SECS")?,
            ),
            drain_timeout: Duration::from_secs(
                env::var("GATEWAY_DRAIN_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .context("Invalid GATEWAY_DRAIN_TIMEOUT_SECS")?,
            ),
            shutdown_timeout: Duration::from_secs(
                env::var("GATEWAY_SHUTDOWN_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .context("Invalid GATEWAY_SHUTDOWN_TIMEOUT_SECS")?,
            ),

            metrics_enabled: env::var("GATEWAY_METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
        })
    }
}

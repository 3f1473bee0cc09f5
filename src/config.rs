//! Configuration management for the ingress guard.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GuardError, Result};
use crate::ratelimit::LimiterSettings;

/// Prefix for environment variable overrides, e.g.
/// `INGRESS_GUARD__RATE_LIMITING__MAX_REQUESTS_PER_WINDOW=120`.
pub const ENV_PREFIX: &str = "INGRESS_GUARD";

/// Main configuration for the ingress guard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Derive client identity from `X-Forwarded-For` when present.
    ///
    /// Only enable this behind a proxy that overwrites the header.
    #[serde(default = "default_trust_forwarded_for")]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            trust_forwarded_for: default_trust_forwarded_for(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_trust_forwarded_for() -> bool {
    true
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per identity between two resets
    #[serde(default = "default_max_requests")]
    pub max_requests_per_window: u64,

    /// How long an identity stays blocked after crossing the threshold
    #[serde(default = "default_block_duration")]
    pub block_duration_ms: u64,

    /// Interval between bulk resets of the request counters
    #[serde(default = "default_reset_interval")]
    pub reset_interval_ms: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_requests_per_window: default_max_requests(),
            block_duration_ms: default_block_duration(),
            reset_interval_ms: default_reset_interval(),
        }
    }
}

fn default_max_requests() -> u64 {
    60
}

fn default_block_duration() -> u64 {
    600_000
}

fn default_reset_interval() -> u64 {
    60_000
}

impl RateLimitingConfig {
    /// Check the values and convert them into limiter settings.
    pub fn settings(&self) -> Result<LimiterSettings> {
        let settings = LimiterSettings {
            max_requests_per_window: self.max_requests_per_window,
            block_duration: Duration::from_millis(self.block_duration_ms),
            reset_interval: Duration::from_millis(self.reset_interval_ms),
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl GuardConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading guard configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    ///
    /// Rate limiting values are validated the same way as in [`load`](Self::load).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GuardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse guard config: {}", e)))?;
        config.rate_limiting.settings()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply
    /// `INGRESS_GUARD__*` environment overrides on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading guard configuration");
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<GuardConfig>()?;

        config.rate_limiting.settings()?;
        Ok(config)
    }
}

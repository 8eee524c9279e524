//! Configuration management for Scoop.
//!
//! Configuration is layered: serde defaults, then an optional YAML file,
//! then `SCOOP__`-prefixed environment variables.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, ScoopError};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "SCOOP";

/// Main configuration for the Scoop service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoopConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Feature flag configuration
    #[serde(default)]
    pub flags: FlagsConfig,

    /// Flavor catalog configuration
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Externally visible base URL used when building item URIs.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            public_url: None,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

/// Which counter store backs the rate limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterBackend {
    /// Process-local store; counters do not survive restarts.
    #[default]
    Memory,
    /// Shared Redis store.
    Redis,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Counter store backend
    #[serde(default)]
    pub backend: CounterBackend,

    /// Redis connection URL, used by the redis backend
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prefix prepended to every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Timeout for a single counter store call in milliseconds
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,

    /// Interval between sweeps of expired in-memory counters
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            backend: CounterBackend::default(),
            redis_url: default_redis_url(),
            key_prefix: default_key_prefix(),
            store_timeout_ms: default_store_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl RateLimitingConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

fn default_key_prefix() -> String {
    "scoop:ratelimit:".to_string()
}

fn default_store_timeout() -> u64 {
    500
}

fn default_sweep_interval() -> u64 {
    60
}

/// Feature flag configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagsConfig {
    /// Path to the YAML flag definitions. Without it every flag is unavailable.
    #[serde(default)]
    pub path: Option<String>,

    /// Flag file reload interval in seconds (0 disables reloading)
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,

    /// Timeout for a single flag evaluation in milliseconds
    #[serde(default = "default_flag_timeout")]
    pub timeout_ms: u64,

    /// Flag holding the per-minute request limit
    #[serde(default = "default_rate_limit_flag")]
    pub rate_limit_flag: String,

    /// Flag holding the write permission
    #[serde(default = "default_write_permission_flag")]
    pub write_permission_flag: String,
}

impl Default for FlagsConfig {
    fn default() -> Self {
        Self {
            path: None,
            reload_interval_secs: default_reload_interval(),
            timeout_ms: default_flag_timeout(),
            rate_limit_flag: default_rate_limit_flag(),
            write_permission_flag: default_write_permission_flag(),
        }
    }
}

impl FlagsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_reload_interval() -> u64 {
    30
}

fn default_flag_timeout() -> u64 {
    500
}

fn default_rate_limit_flag() -> String {
    "api-rate-limiter".to_string()
}

fn default_write_permission_flag() -> String {
    "api-write-permission".to_string()
}

/// Flavor catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Start with the three stock flavors
    #[serde(default = "default_seed_defaults")]
    pub seed_defaults: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            seed_defaults: default_seed_defaults(),
        }
    }
}

fn default_seed_defaults() -> bool {
    true
}

impl ScoopConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ScoopError::Config(e.to_string()))
    }

    /// Load layered configuration: defaults, optional file, then environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::new(path, config::FileFormat::Yaml).required(true),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

//! Configuration management for Floodgate.
//!
//! Settings come from an optional YAML file layered under
//! `FLOODGATE__`-prefixed environment variables, e.g.
//! `FLOODGATE__STORAGE__BACKEND=persistent`. They are loaded and validated
//! once at startup; there is no way to change them at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{
    EndpointClassifier, EndpointRule, PolicyCatalog, PolicyConfig, RateLimitRules,
    DEFAULT_KEY_PREFIX,
};
use crate::store::DEFAULT_MAX_ENTRIES;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for the Floodgate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Whether requests are throttled at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Counter storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Policy name -> limits. Empty means the built-in catalog.
    #[serde(default)]
    pub policies: HashMap<String, PolicyConfig>,

    /// Ordered endpoint rules. Empty means the built-in table.
    #[serde(default)]
    pub endpoints: Vec<EndpointRule>,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            policies: HashMap::new(),
            endpoints: Vec::new(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local bounded map
    Memory,
    /// Shared Redis-compatible cache
    Persistent,
}

/// Counter storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Connection URL for the persistent backend
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Upper bound on each persistent get/set, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound on connecting to the persistent backend at startup
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Entry cap for the in-memory backend
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Namespace prepended to every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            redis_url: None,
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_entries: default_max_entries(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::Memory
}

fn default_timeout_ms() -> u64 {
    250
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

impl FloodgateConfig {
    /// Load configuration from an optional file plus environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: FloodgateConfig = builder.build()?.try_deserialize()?;
        config.normalize_policy_names();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: FloodgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(e.to_string()))?;
        config.normalize_policy_names();
        config.validate()?;
        Ok(config)
    }

    /// Lowercase policy names on both sides of the endpoint table.
    ///
    /// The `config` crate lowercases map keys but not values, so `Auth` as a
    /// policy key and as an endpoint's `policy` must meet as `auth`.
    fn normalize_policy_names(&mut self) {
        self.policies = std::mem::take(&mut self.policies)
            .into_iter()
            .map(|(name, policy)| (name.to_lowercase(), policy))
            .collect();
        for rule in &mut self.endpoints {
            rule.policy = rule.policy.to_lowercase();
        }
    }

    /// Check every setting that could otherwise fail at request time.
    pub fn validate(&self) -> Result<()> {
        if self.storage.timeout_ms == 0 {
            return Err(FloodgateError::Config(
                "storage.timeout_ms must be positive".into(),
            ));
        }
        if self.storage.connect_timeout_ms == 0 {
            return Err(FloodgateError::Config(
                "storage.connect_timeout_ms must be positive".into(),
            ));
        }
        if self.storage.max_entries == 0 {
            return Err(FloodgateError::Config(
                "storage.max_entries must be positive".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Persistent && self.storage.redis_url.is_none() {
            return Err(FloodgateError::Config(
                "storage.redis_url is required for the persistent backend".into(),
            ));
        }
        self.build_rules().map(|_| ())
    }

    /// The policy + endpoint rule document described by this configuration.
    pub fn rules(&self) -> RateLimitRules {
        RateLimitRules {
            policies: self.policies.clone(),
            endpoints: self.endpoints.clone(),
        }
    }

    /// Validated policy catalog and endpoint classifier.
    pub fn build_rules(&self) -> Result<(PolicyCatalog, EndpointClassifier)> {
        self.rules().build()
    }
}

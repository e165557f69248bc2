//! Named rate limit policies.
//!
//! A policy is the `{max requests, window length}` pair applied to a class of
//! endpoints. The catalog is validated once at startup and is immutable
//! afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// Policy applied when classification finds no specific match.
pub const DEFAULT_POLICY: &str = "public";

/// Longest accepted window: one year. Keeps `now + window` in epoch
/// milliseconds far from `i64::MAX`.
pub const MAX_WINDOW_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Raw policy settings as they appear in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Hard cap on requests per window
    pub max_requests: u32,
    /// Window length before the counter resets
    pub window_seconds: u64,
}

impl PolicyConfig {
    pub const fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }
}

/// A validated rate limit policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    name: String,
    max_requests: u32,
    window_seconds: u64,
}

impl Policy {
    /// Build a policy, rejecting non-positive limits and windows longer than
    /// [`MAX_WINDOW_SECONDS`].
    pub fn new(name: impl Into<String>, max_requests: u32, window_seconds: u64) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(FloodgateError::Config("policy name must not be empty".into()));
        }
        if max_requests == 0 {
            return Err(FloodgateError::Config(format!(
                "policy '{}': max_requests must be positive",
                name
            )));
        }
        if window_seconds == 0 {
            return Err(FloodgateError::Config(format!(
                "policy '{}': window_seconds must be positive",
                name
            )));
        }
        if window_seconds > MAX_WINDOW_SECONDS {
            return Err(FloodgateError::Config(format!(
                "policy '{}': window_seconds must not exceed {}",
                name, MAX_WINDOW_SECONDS
            )));
        }
        Ok(Self {
            name,
            max_requests,
            window_seconds,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Policies shipped when configuration does not provide any.
pub fn builtin_policies() -> HashMap<String, PolicyConfig> {
    [
        ("auth", PolicyConfig::new(5, 60)),
        ("forms", PolicyConfig::new(10, 60)),
        ("upload", PolicyConfig::new(20, 60)),
        ("api", PolicyConfig::new(100, 60)),
        (DEFAULT_POLICY, PolicyConfig::new(300, 60)),
    ]
    .into_iter()
    .map(|(name, config)| (name.to_string(), config))
    .collect()
}

/// The immutable set of policies known to a limiter.
#[derive(Debug, Clone)]
pub struct PolicyCatalog {
    policies: HashMap<String, Policy>,
}

impl PolicyCatalog {
    /// Validate raw settings into a catalog.
    ///
    /// Fails if any policy has a non-positive limit or window, or if the
    /// default policy is missing.
    pub fn from_config(configs: &HashMap<String, PolicyConfig>) -> Result<Self> {
        let mut policies = HashMap::with_capacity(configs.len());
        for (name, cfg) in configs {
            let policy = Policy::new(name.clone(), cfg.max_requests, cfg.window_seconds)?;
            policies.insert(name.clone(), policy);
        }

        if !policies.contains_key(DEFAULT_POLICY) {
            return Err(FloodgateError::Config(format!(
                "policy catalog must define the default '{}' policy",
                DEFAULT_POLICY
            )));
        }

        Ok(Self { policies })
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        let policies = builtin_policies()
            .into_iter()
            .map(|(name, cfg)| {
                let policy = Policy {
                    name: name.clone(),
                    max_requests: cfg.max_requests,
                    window_seconds: cfg.window_seconds,
                };
                (name, policy)
            })
            .collect();
        Self { policies }
    }

    /// Look up a policy by exact name.
    pub fn get(&self, name: &str) -> Option<&Policy> {
        self.policies.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.policies.contains_key(name)
    }

    /// Look up a policy, falling back to the default one for unknown names.
    pub fn resolve(&self, name: &str) -> &Policy {
        self.policies
            .get(name)
            .unwrap_or_else(|| self.default_policy())
    }

    pub fn default_policy(&self) -> &Policy {
        // Presence is checked in every constructor.
        &self.policies[DEFAULT_POLICY]
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.policies.keys().map(String::as_str)
    }
}

impl Default for PolicyCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

//! # Configuration
//!
//! The control plane is configured from a TOML document. Every section is optional and
//! falls back to the defaults below; only `[[targets]]` has to be supplied for the control
//! plane to do anything useful.
//!
//! ```toml
//! [fetch]
//! max_concurrency = 20
//! timeout_secs = 360
//!
//! [workers]
//! count = 4
//! queue_depth = 64
//!
//! [[targets]]
//! address = "10.10.0.1"
//! vendor = "avi"
//! username = "admin"
//! password = "secret"
//! ipam_network = "10.0.0.0/16"
//! ```

use crate::error::{LbError, Result};
use crate::model::{Cidr, Vendor};
use crate::vendor::rpc::Credentials;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub fetch: FetchSettings,
    pub workers: WorkerSettings,
    pub cache: CacheSettings,
    pub retry: RetrySettings,
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Targets fetched at the same time.
    pub max_concurrency: usize,
    /// Per-target budget, counted from the moment the target gets a worker slot.
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            timeout_secs: 360,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub count: usize,
    pub queue_depth: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 4,
            queue_depth: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Request channel capacity of each collection actor.
    pub buffer_size: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { buffer_size: 32 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

/// One appliance the control plane manages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub address: String,
    pub vendor: Vendor,
    pub username: String,
    pub password: String,
    /// Network IPAM allocates virtual server addresses from.
    #[serde(default)]
    pub ipam_network: Option<Cidr>,
}

impl TargetConfig {
    pub fn new(address: impl Into<String>, vendor: Vendor) -> Self {
        Self {
            address: address.into(),
            vendor,
            username: "admin".into(),
            password: String::new(),
            ipam_network: None,
        }
    }

    pub fn with_ipam_network(mut self, network: Cidr) -> Self {
        self.ipam_network = Some(network);
        self
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }
}

impl ControlPlaneConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ControlPlaneConfig =
            toml::from_str(content).map_err(|e| LbError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file, or returns the defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file does not exist, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| LbError::Config(format!("failed to read {}: {e}", path.display())))?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), targets = config.targets.len(), "Loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_concurrency == 0 {
            return Err(LbError::Config("fetch.max_concurrency must be positive".into()));
        }
        if self.workers.count == 0 || self.workers.queue_depth == 0 {
            return Err(LbError::Config(
                "workers.count and workers.queue_depth must be positive".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(LbError::Config("retry.max_attempts must be positive".into()));
        }
        if self.cache.buffer_size == 0 {
            return Err(LbError::Config("cache.buffer_size must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for target in &self.targets {
            if !seen.insert(target.address.as_str()) {
                return Err(LbError::Config(format!("duplicate target {}", target.address)));
            }
        }
        Ok(())
    }

    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.targets.push(target);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ControlPlaneConfig::from_toml("").unwrap();
        assert_eq!(config.fetch.max_concurrency, 20);
        assert_eq!(config.fetch.timeout(), Duration::from_secs(360));
        assert_eq!(config.workers.count, 4);
        assert!(config.targets.is_empty());
    }

    #[test]
    fn test_targets_parse() {
        let config = ControlPlaneConfig::from_toml(
            r#"
            [fetch]
            max_concurrency = 5

            [[targets]]
            address = "10.10.0.1"
            vendor = "netscaler"
            username = "nsroot"
            password = "nsroot"
            ipam_network = "10.0.0.0/24"
            "#,
        )
        .unwrap();

        assert_eq!(config.fetch.max_concurrency, 5);
        assert_eq!(config.fetch.timeout_secs, 360);
        let target = &config.targets[0];
        assert_eq!(target.vendor, Vendor::Netscaler);
        assert_eq!(target.ipam_network.unwrap().prefix(), 24);
    }

    #[test]
    fn test_rejects_duplicates_and_bad_values() {
        let dup = r#"
            [[targets]]
            address = "a"
            vendor = "avi"
            username = "u"
            password = "p"
            [[targets]]
            address = "a"
            vendor = "avi"
            username = "u"
            password = "p"
        "#;
        assert!(matches!(ControlPlaneConfig::from_toml(dup), Err(LbError::Config(_))));
        assert!(ControlPlaneConfig::from_toml("[fetch]\nmax_concurrency = 0").is_err());
        let unknown_vendor = "[[targets]]\naddress = \"a\"\nvendor = \"f5\"";
        assert!(ControlPlaneConfig::from_toml(unknown_vendor).is_err());
    }

    #[test]
    fn test_unbounded_retry_is_rejected() {
        let result = ControlPlaneConfig::from_toml("[retry]\nmax_attempts = 0");
        assert!(matches!(result, Err(LbError::Config(msg)) if msg.contains("retry.max_attempts")));

        let mut config = ControlPlaneConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}

use crate::adapters::Resource;
use crate::error::{LbError, Result};
use crate::model::{parse_ipv4, Certificate, HealthMonitor, PersistenceProfile};
use collection_actor::CollectionEntity;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_POOL_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LbAlgorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    ConsistentHash,
}

impl fmt::Display for LbAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LbAlgorithm::RoundRobin => "round-robin",
            LbAlgorithm::LeastConnections => "least-connections",
            LbAlgorithm::ConsistentHash => "consistent-hash",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Server {
    pub ip: String,
    pub port: u16,
}

/// Pool membership of one backend. Identity is `ip:port`; neither vendor has a
/// first-class object for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub server: Server,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Binding {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            server: Server {
                ip: ip.into(),
                port,
            },
            enabled: true,
        }
    }

    pub fn key(&self) -> String {
        format!("{}:{}", self.server.ip, self.server.port)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pool {
    pub name: String,
    pub source_uuid: String,
    pub algorithm: LbAlgorithm,
    pub default_port: u16,
    pub bindings: Vec<Binding>,
    pub health_monitors: Vec<HealthMonitor>,
    pub persistence: Option<PersistenceProfile>,
    /// Backend TLS material, for re-encrypting pools.
    pub certificate: Option<Certificate>,
}

impl Pool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_binding(mut self, ip: impl Into<String>, port: u16) -> Self {
        self.bindings.push(Binding::new(ip, port));
        self
    }

    pub fn with_monitor(mut self, monitor: HealthMonitor) -> Self {
        self.health_monitors.push(monitor);
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceProfile) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn monitor_uuids(&self) -> impl Iterator<Item = &str> {
        self.health_monitors.iter().map(|m| m.source_uuid.as_str())
    }

    pub fn references(&self, kind: &str, uuid: &str) -> bool {
        if uuid.is_empty() {
            return false;
        }
        match kind {
            k if k == HealthMonitor::KIND => self.monitor_uuids().any(|u| u == uuid),
            k if k == PersistenceProfile::KIND => self
                .persistence
                .as_ref()
                .is_some_and(|p| p.source_uuid == uuid),
            k if k == Certificate::KIND => self
                .certificate
                .as_ref()
                .is_some_and(|c| c.source_uuid == uuid),
            _ => false,
        }
    }
}

impl CollectionEntity for Pool {
    const KIND: &'static str = "pool";

    fn name(&self) -> &str {
        &self.name
    }

    fn source_uuid(&self) -> &str {
        &self.source_uuid
    }
}

impl Resource for Pool {
    fn apply_defaults(&mut self) {
        if self.default_port == 0 {
            self.default_port = DEFAULT_POOL_PORT;
        }
        for binding in &mut self.bindings {
            if binding.server.port == 0 {
                binding.server.port = self.default_port;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LbError::validation("pool name is required"));
        }
        for binding in &self.bindings {
            parse_ipv4(&binding.server.ip).map_err(|_| {
                LbError::validation(format!(
                    "pool '{}': backend '{}' is not an IPv4 address",
                    self.name, binding.server.ip
                ))
            })?;
        }
        Ok(())
    }
}

use crate::model::{Vendor, VirtualServer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `staged → ready | not-ready → migrating → migrated | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MigrationStatus {
    #[default]
    Staged,
    Ready,
    NotReady,
    Migrating,
    Migrated,
    Failed,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MigrationStatus::Staged => "staged",
            MigrationStatus::Ready => "ready",
            MigrationStatus::NotReady => "not-ready",
            MigrationStatus::Migrating => "migrating",
            MigrationStatus::Migrated => "migrated",
            MigrationStatus::Failed => "failed",
        })
    }
}

/// One readiness check. Failures carry every reason found, not just the first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CheckResult {
    pub passed: bool,
    pub detail: Vec<String>,
}

impl CheckResult {
    pub fn pass() -> Self {
        Self {
            passed: true,
            detail: Vec::new(),
        }
    }

    /// Passes exactly when `problems` is empty.
    pub fn from_problems(problems: Vec<String>) -> Self {
        Self {
            passed: problems.is_empty(),
            detail: problems,
        }
    }
}

/// Another source virtual server answering on the same IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyPeer {
    pub name: String,
    pub source_uuid: String,
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub ready: bool,
    pub peers: Vec<DependencyPeer>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PoolReadiness {
    pub pool: String,
    pub persistence: CheckResult,
    pub servers: CheckResult,
    pub health_monitors: CheckResult,
}

impl PoolReadiness {
    pub fn ready(&self) -> bool {
        self.persistence.passed && self.servers.passed && self.health_monitors.passed
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReadinessChecks {
    pub ip_routing: CheckResult,
    pub network_service: CheckResult,
    pub dependency: DependencyStatus,
    /// Fails only when the virtual server has no pool at all.
    pub pool_presence: CheckResult,
    pub pools: Vec<PoolReadiness>,
}

impl ReadinessChecks {
    /// Logical AND of every check.
    pub fn ready(&self) -> bool {
        self.ip_routing.passed
            && self.network_service.passed
            && self.dependency.ready
            && self.pool_presence.passed
            && self.pools.iter().all(PoolReadiness::ready)
    }

    /// Every failure reason, prefixed with the check it came from.
    pub fn failures(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut push = |check: &str, result: &CheckResult| {
            if !result.passed {
                out.extend(result.detail.iter().map(|d| format!("{check}: {d}")));
            }
        };
        push("ip-routing", &self.ip_routing);
        push("network-service", &self.network_service);
        push("pools", &self.pool_presence);
        for pool in &self.pools {
            push(&format!("pool '{}' persistence", pool.pool), &pool.persistence);
            push(&format!("pool '{}' servers", pool.pool), &pool.servers);
            push(&format!("pool '{}' health monitors", pool.pool), &pool.health_monitors);
        }
        if !self.dependency.ready {
            let names: Vec<&str> = self.dependency.peers.iter().map(|p| p.name.as_str()).collect();
            out.push(format!("dependency: IP shared with {}", names.join(", ")));
        }
        out
    }
}

/// A staged cross-vendor migration of one virtual server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
    pub id: String,
    pub source_id: String,
    pub source_address: String,
    pub source_vendor: Vendor,
    pub target_vendor: Vendor,
    pub target_address: String,
    pub status: MigrationStatus,
    pub checks: ReadinessChecks,
    /// Target-vendor configuration the cutover creates.
    pub target: VirtualServer,
    /// Record id of the created target, once migrated.
    pub target_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,
}

impl Migration {
    pub fn ready(&self) -> bool {
        self.checks.ready()
    }

    pub fn touch(&mut self, status: MigrationStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

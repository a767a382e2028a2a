use crate::model::{Binding, Certificate, HealthMonitor, PersistenceProfile, Pool, PoolGroup};
use collection_actor::CollectionEntity;
use serde::Serialize;

/// Children that dropped out of a parent's desired state during one operation.
///
/// Built by the orchestrators from diff partitions, consumed by dependency cleanup,
/// then discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemovedArtifacts {
    pub pools: Vec<Pool>,
    pub pool_groups: Vec<PoolGroup>,
    pub certificates: Vec<Certificate>,
    pub health_monitors: Vec<HealthMonitor>,
    pub persistence_profiles: Vec<PersistenceProfile>,
    /// Backend bindings dropped from pools. They disappear with the pool write, so they
    /// are reported but never deleted separately.
    pub servers: Vec<Binding>,
}

impl RemovedArtifacts {
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
            && self.pool_groups.is_empty()
            && self.certificates.is_empty()
            && self.health_monitors.is_empty()
            && self.persistence_profiles.is_empty()
            && self.servers.is_empty()
    }

    pub fn merge(&mut self, other: RemovedArtifacts) {
        self.pools.extend(other.pools);
        self.pool_groups.extend(other.pool_groups);
        self.certificates.extend(other.certificates);
        self.health_monitors.extend(other.health_monitors);
        self.persistence_profiles.extend(other.persistence_profiles);
        self.servers.extend(other.servers);
    }

    /// Drops pool candidates that the parent still uses.
    pub fn retain_unreferenced_pools(&mut self, live_uuids: &[&str]) {
        self.pools.retain(|p| !live_uuids.contains(&p.source_uuid()));
    }

    /// Drops certificate candidates that the parent still uses.
    pub fn retain_unreferenced_certificates(&mut self, live_uuids: &[&str]) {
        self.certificates
            .retain(|c| !live_uuids.contains(&c.source_uuid()));
    }
}

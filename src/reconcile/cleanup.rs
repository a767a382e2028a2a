//! Orphan reclamation after a Modify or Delete.

use crate::adapters::{AdapterSet, Resource, ResourceAdapter};
use crate::error::Result;
use crate::model::{
    Certificate, HealthMonitor, PersistenceProfile, Pool, PoolGroup, RemovedArtifacts,
    VirtualServer,
};
use crate::vendor::ApplianceOps;
use collection_actor::CollectionEntity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    /// Still referenced by a live parent, left on the appliance.
    pub skipped: Vec<String>,
    /// The delete call itself failed.
    pub failed: Vec<String>,
}

impl CleanupReport {
    pub fn warnings(&self) -> Vec<String> {
        self.skipped.iter().chain(&self.failed).cloned().collect()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Deletes removed children that no live parent references any more.
///
/// Candidates are processed parents first (pool groups, pools, certificates,
/// persistence profiles, health monitors) and deleting a parent makes its own children
/// candidates. Errors never propagate: they become warnings in the report.
#[derive(Clone)]
pub struct DependencyCleanup {
    adapters: AdapterSet,
    ops: Arc<dyn ApplianceOps>,
}

impl DependencyCleanup {
    pub fn new(adapters: AdapterSet, ops: Arc<dyn ApplianceOps>) -> Self {
        Self { adapters, ops }
    }

    pub async fn run(&self, removed: RemovedArtifacts) -> CleanupReport {
        let mut report = CleanupReport::default();
        if removed.is_empty() {
            return report;
        }
        if !removed.servers.is_empty() {
            debug!(count = removed.servers.len(), "Bindings removed with their pool write");
        }

        let mut pools = removed.pools;
        if let Some(groups) = &self.adapters.pool_groups {
            for group in self.reclaim(groups, removed.pool_groups, &mut report).await {
                pools.extend(group.pools);
            }
        }

        let mut certificates = removed.certificates;
        let mut persistence = removed.persistence_profiles;
        let mut monitors = removed.health_monitors;
        for pool in self.reclaim(&self.adapters.pools, pools, &mut report).await {
            monitors.extend(pool.health_monitors);
            persistence.extend(pool.persistence);
            certificates.extend(pool.certificate);
        }

        self.reclaim(&self.adapters.certificates, certificates, &mut report)
            .await;
        if let Some(profiles) = &self.adapters.persistence {
            self.reclaim(profiles, persistence, &mut report).await;
        }
        self.reclaim(&self.adapters.health_monitors, monitors, &mut report)
            .await;

        info!(
            deleted = report.deleted.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Cleanup finished"
        );
        report
    }

    /// Deletes every unreferenced candidate and returns the ones actually deleted.
    async fn reclaim<R: Resource>(
        &self,
        adapter: &ResourceAdapter<R>,
        candidates: Vec<R>,
        report: &mut CleanupReport,
    ) -> Vec<R> {
        let mut seen = HashSet::new();
        let mut deleted = Vec::new();

        for candidate in candidates {
            let uuid = candidate.source_uuid().to_string();
            // Inline children (no appliance object) and duplicates.
            if uuid.is_empty() || !seen.insert(uuid.clone()) {
                continue;
            }
            let label = format!("{} '{}'", R::KIND, candidate.name());
            if self.ops.is_default(R::KIND, candidate.name()) {
                debug!(%label, "Default object, never deleted");
                continue;
            }

            match self.holders_of(R::KIND, &uuid).await {
                Ok(holders) if !holders.is_empty() => {
                    let msg = format!("{label} kept: still referenced by {}", holders.join(", "));
                    warn!(%uuid, "{msg}");
                    report.skipped.push(msg);
                }
                Ok(_) => match adapter.delete(&candidate).await {
                    Ok(()) => {
                        report.deleted.push(label);
                        deleted.push(candidate);
                    }
                    Err(e) => {
                        let msg = format!("{label} not deleted: {e}");
                        warn!(%uuid, "{msg}");
                        report.failed.push(msg);
                    }
                },
                Err(e) => {
                    let msg = format!("{label} not deleted, reference scan failed: {e}");
                    warn!(%uuid, "{msg}");
                    report.failed.push(msg);
                }
            }
        }
        deleted
    }

    /// Live parents whose current child set contains `uuid`.
    async fn holders_of(&self, kind: &str, uuid: &str) -> Result<Vec<String>> {
        let mut holders = Vec::new();

        let scan_servers =
            kind == PoolGroup::KIND || kind == Pool::KIND || kind == Certificate::KIND;
        if scan_servers {
            for vs in self.adapters.virtual_servers.snapshot().await? {
                let refers = match kind {
                    k if k == PoolGroup::KIND => vs.references_pool_group(uuid),
                    k if k == Pool::KIND => vs.references_pool(uuid),
                    _ => vs.references_certificate(uuid),
                };
                if refers {
                    holders.push(format!("{} '{}'", VirtualServer::KIND, vs.name));
                }
            }
        }

        if kind == Pool::KIND {
            if let Some(groups) = &self.adapters.pool_groups {
                for group in groups.snapshot().await? {
                    if group.references(uuid) {
                        holders.push(format!("{} '{}'", PoolGroup::KIND, group.name));
                    }
                }
            }
        }

        let scan_pools = kind == Certificate::KIND
            || kind == PersistenceProfile::KIND
            || kind == HealthMonitor::KIND;
        if scan_pools {
            for pool in self.adapters.pools.snapshot().await? {
                if pool.references(kind, uuid) {
                    holders.push(format!("{} '{}'", Pool::KIND, pool.name));
                }
            }
        }

        Ok(holders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CacheClients;
    use crate::mock::MockAppliance;
    use crate::model::MonitorType;
    use crate::vendor::avi::{self, AviOps};
    use collection_actor::{CollectionActor, CollectionClient};
    use serde_json::json;

    fn cache<T: CollectionEntity>() -> CollectionClient<T> {
        let (actor, client) = CollectionActor::<T>::new(16);
        tokio::spawn(actor.run());
        client
    }

    fn avi_cleanup(appliance: &Arc<MockAppliance>) -> (AdapterSet, DependencyCleanup) {
        let session = appliance.session();
        let caches = CacheClients {
            certificates: cache(),
            health_monitors: cache(),
            persistence: cache(),
            pools: cache(),
            pool_groups: cache(),
            virtual_servers: cache(),
        };
        let adapters = avi::adapters(appliance.address(), session.clone(), caches);
        let cleanup = DependencyCleanup::new(adapters.clone(), Arc::new(AviOps::new(session)));
        (adapters, cleanup)
    }

    async fn monitor(adapters: &AdapterSet, name: &str) -> HealthMonitor {
        let mut monitor = HealthMonitor::new(name, MonitorType::Tcp);
        adapters.health_monitors.create(&mut monitor).await.unwrap();
        monitor
    }

    #[tokio::test]
    async fn test_deleted_pool_cascades_to_its_children() {
        let appliance = MockAppliance::avi("10.10.0.1");
        let system_uuid = appliance.seed(
            avi::HEALTH_MONITOR,
            json!({ "name": "System-TCP", "type": "HEALTH_MONITOR_TCP" }),
        );
        let (adapters, cleanup) = avi_cleanup(&appliance);

        let system = adapters
            .health_monitors
            .fetch_by_name("System-TCP")
            .await
            .unwrap()
            .expect("default monitor present");
        let shared = monitor(&adapters, "shared-check").await;
        let own = monitor(&adapters, "own-check").await;

        let mut old = Pool::new("old")
            .with_binding("10.0.0.5", 80)
            .with_monitor(system.clone())
            .with_monitor(shared.clone())
            .with_monitor(own.clone());
        adapters.pools.create(&mut old).await.unwrap();
        let mut keeper = Pool::new("keeper")
            .with_binding("10.0.0.6", 80)
            .with_monitor(shared.clone());
        adapters.pools.create(&mut keeper).await.unwrap();

        let report = cleanup
            .run(RemovedArtifacts {
                pools: vec![old.clone()],
                ..Default::default()
            })
            .await;

        assert_eq!(report.deleted, vec!["pool 'old'", "health-monitor 'own-check'"]);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0]
            .contains("'shared-check' kept: still referenced by pool 'keeper'"));
        assert!(!report.has_failures());

        assert!(appliance.object(avi::POOL, &old.source_uuid).is_none());
        assert!(appliance.object(avi::HEALTH_MONITOR, &own.source_uuid).is_none());
        assert!(appliance.object(avi::HEALTH_MONITOR, &shared.source_uuid).is_some());
        assert!(appliance.object(avi::HEALTH_MONITOR, &system_uuid).is_some());
    }

    #[tokio::test]
    async fn test_failed_delete_is_reported_not_raised() {
        let appliance = MockAppliance::avi("10.10.0.1");
        let (adapters, cleanup) = avi_cleanup(&appliance);
        let orphan = monitor(&adapters, "orphan").await;
        appliance.fail_always(
            crate::mock::Method::Delete,
            "/api/healthmonitor",
            crate::vendor::rpc::RpcError::Transport("reset".into()),
        );

        let report = cleanup
            .run(RemovedArtifacts {
                health_monitors: vec![orphan],
                ..Default::default()
            })
            .await;

        assert!(report.deleted.is_empty());
        assert!(report.has_failures());
        assert!(report.warnings()[0].starts_with("health-monitor 'orphan' not deleted"));
    }
}

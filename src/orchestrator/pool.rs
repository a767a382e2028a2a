use super::{ensure_leaf, sync_leaf, MutationOutcome};
use crate::adapters::{AdapterSet, ResourceAdapter};
use crate::error::{LbError, Result};
use crate::model::{
    Certificate, HealthMonitor, LbAlgorithm, PersistenceProfile, Pool, RemovedArtifacts, Vendor,
};
use crate::reconcile::{adopt_by_name, diff, DependencyCleanup, Identity};
use crate::vendor::ApplianceOps;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Pool → {health monitors, persistence profile, certificate, server bindings}.
#[derive(Clone)]
pub struct PoolOrchestrator {
    vendor: Vendor,
    pools: ResourceAdapter<Pool>,
    health_monitors: ResourceAdapter<HealthMonitor>,
    persistence: Option<ResourceAdapter<PersistenceProfile>>,
    certificates: ResourceAdapter<Certificate>,
    ops: Arc<dyn ApplianceOps>,
    cleanup: DependencyCleanup,
}

impl PoolOrchestrator {
    pub fn new(
        adapters: &AdapterSet,
        ops: Arc<dyn ApplianceOps>,
        cleanup: DependencyCleanup,
    ) -> Self {
        Self {
            vendor: adapters.pools.vendor(),
            pools: adapters.pools.clone(),
            health_monitors: adapters.health_monitors.clone(),
            persistence: adapters.persistence.clone(),
            certificates: adapters.certificates.clone(),
            ops,
            cleanup,
        }
    }

    #[instrument(skip(self, pool), fields(entity_type = "pool", name = %pool.name))]
    pub async fn create(&self, mut pool: Pool) -> Result<MutationOutcome<Pool>> {
        if !pool.source_uuid.is_empty() {
            return Err(LbError::validation(format!(
                "pool '{}' already exists as {}",
                pool.name, pool.source_uuid
            )));
        }
        self.ensure(&mut pool).await?;
        Ok(MutationOutcome::new(pool))
    }

    #[instrument(skip(self, requested), fields(entity_type = "pool", name = %requested.name))]
    pub async fn modify(&self, requested: &Pool) -> Result<MutationOutcome<Pool>> {
        let (record, removed) = self.apply_modify(requested).await?;
        let report = self.cleanup.run(removed.clone()).await;
        Ok(MutationOutcome {
            record,
            removed,
            warnings: report.warnings(),
        })
    }

    /// Deletes the pool unless a live parent still uses it, then its orphaned children.
    #[instrument(skip(self, pool), fields(entity_type = "pool", name = %pool.name))]
    pub async fn delete(&self, pool: &Pool) -> Result<MutationOutcome<Pool>> {
        let current = self.pools.resolve(&pool.source_uuid).await?;
        let removed = RemovedArtifacts {
            pools: vec![current.clone()],
            ..Default::default()
        };
        let report = self.cleanup.run(removed.clone()).await;
        Ok(MutationOutcome {
            record: current,
            removed,
            warnings: report.warnings(),
        })
    }

    pub async fn fetch(&self, uuid: &str) -> Result<Pool> {
        self.pools.fetch(uuid).await
    }

    pub async fn fetch_all(&self) -> Result<Vec<Pool>> {
        self.pools.fetch_all().await
    }

    /// Makes the pool exist: created with its children when it has no identity, attached
    /// as found otherwise.
    pub(crate) async fn ensure(&self, pool: &mut Pool) -> Result<()> {
        let inline = self.inline_settings(pool);
        if pool.source_uuid.is_empty() {
            self.ensure_children(pool).await?;
            self.pools.create(pool).await?;
        } else {
            *pool = self.pools.resolve(&pool.source_uuid).await?;
        }
        self.restore_inline(pool, inline);
        Ok(())
    }

    /// Reconciles an existing pool and returns it with the children it dropped. No
    /// cleanup runs here; the caller owns that.
    pub(crate) async fn apply_modify(&self, requested: &Pool) -> Result<(Pool, RemovedArtifacts)> {
        if requested.source_uuid.is_empty() {
            return Err(LbError::validation(format!(
                "pool '{}' has not been created",
                requested.name
            )));
        }
        let baseline = self.pools.fetch(&requested.source_uuid).await?;
        let mut pool = requested.clone();
        let inline = self.inline_settings(&pool);
        let mut removed = RemovedArtifacts::default();

        adopt_by_name(&mut pool.health_monitors, &baseline.health_monitors);
        let monitors = diff(&pool.health_monitors, &baseline.health_monitors);
        let existing: HashSet<String> =
            monitors.updated.iter().map(|m| m.source_uuid.clone()).collect();
        removed.health_monitors = monitors.removed;
        for monitor in &mut pool.health_monitors {
            let exists = existing.contains(&monitor.source_uuid);
            sync_leaf(&self.health_monitors, self.ops.as_ref(), monitor, exists).await?;
        }

        let bindings = diff(&pool.bindings, &baseline.bindings);
        if !bindings.removed.is_empty() {
            debug!(count = bindings.removed.len(), "Bindings dropped");
        }
        removed.servers = bindings.removed;

        if let Some(adapter) = &self.persistence {
            let (kept, dropped) =
                replace_child(pool.persistence.as_mut(), baseline.persistence.as_ref());
            removed.persistence_profiles.extend(dropped);
            if let Some(profile) = pool.persistence.as_mut() {
                sync_leaf(adapter, self.ops.as_ref(), profile, kept).await?;
            }
        }

        let (kept, dropped) =
            replace_child(pool.certificate.as_mut(), baseline.certificate.as_ref());
        removed.certificates.extend(dropped);
        if let Some(certificate) = pool.certificate.as_mut() {
            sync_leaf(&self.certificates, self.ops.as_ref(), certificate, kept).await?;
        }

        let mut fresh = self.pools.modify(&pool).await?;
        self.restore_inline(&mut fresh, inline);
        info!(uuid = %fresh.source_uuid, "Pool reconciled");
        Ok((fresh, removed))
    }

    async fn ensure_children(&self, pool: &mut Pool) -> Result<()> {
        for monitor in &mut pool.health_monitors {
            ensure_leaf(&self.health_monitors, self.ops.as_ref(), monitor).await?;
        }
        if let (Some(adapter), Some(profile)) = (&self.persistence, pool.persistence.as_mut()) {
            ensure_leaf(adapter, self.ops.as_ref(), profile).await?;
        }
        if let Some(certificate) = pool.certificate.as_mut() {
            ensure_leaf(&self.certificates, self.ops.as_ref(), certificate).await?;
        }
        Ok(())
    }

    /// Settings that live on the virtual server on vendors without standalone
    /// persistence objects, so a pool-level fetch cannot return them.
    fn inline_settings(&self, pool: &Pool) -> Option<InlineSettings> {
        (!self.vendor.has_persistence_objects()).then(|| InlineSettings {
            algorithm: pool.algorithm,
            persistence: pool.persistence.clone().map(|mut p| {
                p.source_uuid.clear();
                p
            }),
        })
    }

    fn restore_inline(&self, pool: &mut Pool, inline: Option<InlineSettings>) {
        if let Some(inline) = inline {
            pool.algorithm = inline.algorithm;
            pool.persistence = inline.persistence;
        }
    }
}

struct InlineSettings {
    algorithm: LbAlgorithm,
    persistence: Option<PersistenceProfile>,
}

/// Matches a requested single child against the current one. Returns whether the
/// requested child is the current object, and the current one when it is replaced.
fn replace_child<T: Identity + Clone>(
    requested: Option<&mut T>,
    current: Option<&T>,
) -> (bool, Option<T>) {
    match (requested, current) {
        (Some(requested), Some(current)) => {
            adopt_by_name(std::slice::from_mut(requested), std::slice::from_ref(current));
            if requested.identity() == current.identity() {
                (true, None)
            } else {
                (false, Some(current.clone()))
            }
        }
        (None, Some(current)) => (false, Some(current.clone())),
        (_, None) => (false, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MonitorType, PersistenceType};

    fn monitor(name: &str, uuid: &str) -> HealthMonitor {
        let mut m = HealthMonitor::new(name, MonitorType::Http);
        m.source_uuid = uuid.into();
        m
    }

    #[test]
    fn test_replace_child_adopts_same_name() {
        let current = monitor("hm", "hm-1");
        let mut requested = monitor("hm", "");
        let (kept, dropped) = replace_child(Some(&mut requested), Some(&current));
        assert!(kept);
        assert!(dropped.is_none());
        assert_eq!(requested.source_uuid, "hm-1");
    }

    #[test]
    fn test_replace_child_reports_replaced_and_cleared() {
        let current = monitor("old", "hm-1");
        let mut requested = monitor("new", "");
        let (kept, dropped) = replace_child(Some(&mut requested), Some(&current));
        assert!(!kept);
        assert_eq!(dropped, Some(current.clone()));

        let (kept, dropped) = replace_child::<HealthMonitor>(None, Some(&current));
        assert!(!kept);
        assert_eq!(dropped, Some(current));

        let mut fresh = PersistenceProfile::new("p", PersistenceType::ClientIp);
        assert_eq!(replace_child(Some(&mut fresh), None), (false, None));
    }
}

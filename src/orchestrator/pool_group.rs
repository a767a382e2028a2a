use super::{MutationOutcome, PoolOrchestrator};
use crate::adapters::ResourceAdapter;
use crate::error::{LbError, Result};
use crate::model::{PoolGroup, RemovedArtifacts, MIN_POOL_GROUP_MEMBERS};
use crate::reconcile::{adopt_by_name, diff, DependencyCleanup};
use tracing::{info, instrument, warn};

/// Name given to the group a multi-pool virtual server is fronted by.
pub fn default_group_name(virtual_server: &str) -> String {
    format!("{virtual_server}-group")
}

/// PoolGroup → member pools. Only wired on vendors with a pool-group object.
#[derive(Clone)]
pub struct PoolGroupOrchestrator {
    groups: ResourceAdapter<PoolGroup>,
    pools: PoolOrchestrator,
    cleanup: DependencyCleanup,
}

impl PoolGroupOrchestrator {
    pub fn new(
        groups: ResourceAdapter<PoolGroup>,
        pools: PoolOrchestrator,
        cleanup: DependencyCleanup,
    ) -> Self {
        Self {
            groups,
            pools,
            cleanup,
        }
    }

    pub fn pools(&self) -> &PoolOrchestrator {
        &self.pools
    }

    #[instrument(skip(self, group), fields(entity_type = "pool-group", name = %group.name))]
    pub async fn create(&self, mut group: PoolGroup) -> Result<MutationOutcome<PoolGroup>> {
        if !group.source_uuid.is_empty() {
            return Err(LbError::validation(format!(
                "pool group '{}' already exists as {}",
                group.name, group.source_uuid
            )));
        }
        check_membership(&group)?;
        self.ensure(&mut group).await?;
        Ok(MutationOutcome::new(group))
    }

    /// Reconciles member pools, then membership. The record is `None` when the request
    /// left fewer than two members and the group was dissolved.
    #[instrument(skip(self, requested), fields(entity_type = "pool-group", name = %requested.name))]
    pub async fn modify(
        &self,
        requested: &PoolGroup,
    ) -> Result<MutationOutcome<Option<PoolGroup>>> {
        let mut group = requested.clone();
        let mut removed = RemovedArtifacts::default();
        for pool in group.pools.iter_mut().filter(|p| !p.source_uuid.is_empty()) {
            let (fresh, dropped) = self.pools.apply_modify(pool).await?;
            *pool = fresh;
            removed.merge(dropped);
        }
        let (record, dropped) = self.apply_membership(&group).await?;
        removed.merge(dropped);

        let report = self.cleanup.run(removed.clone()).await;
        Ok(MutationOutcome {
            record,
            removed,
            warnings: report.warnings(),
        })
    }

    #[instrument(skip(self, group), fields(entity_type = "pool-group", name = %group.name))]
    pub async fn delete(&self, group: &PoolGroup) -> Result<MutationOutcome<PoolGroup>> {
        let current = self.groups.resolve(&group.source_uuid).await?;
        let removed = RemovedArtifacts {
            pool_groups: vec![current.clone()],
            ..Default::default()
        };
        let report = self.cleanup.run(removed.clone()).await;
        Ok(MutationOutcome {
            record: current,
            removed,
            warnings: report.warnings(),
        })
    }

    pub async fn fetch(&self, uuid: &str) -> Result<PoolGroup> {
        self.groups.fetch(uuid).await
    }

    pub async fn fetch_all(&self) -> Result<Vec<PoolGroup>> {
        self.groups.fetch_all().await
    }

    /// Creates missing member pools, then the group itself.
    pub(crate) async fn ensure(&self, group: &mut PoolGroup) -> Result<()> {
        if !group.source_uuid.is_empty() {
            *group = self.groups.resolve(&group.source_uuid).await?;
            return Ok(());
        }
        for pool in &mut group.pools {
            self.pools.ensure(pool).await?;
        }
        self.groups.create(group).await
    }

    /// Diffs membership against the appliance. Below the minimum the whole group and
    /// all of its members become removal candidates.
    pub(crate) async fn apply_membership(
        &self,
        requested: &PoolGroup,
    ) -> Result<(Option<PoolGroup>, RemovedArtifacts)> {
        let baseline = self.groups.fetch(&requested.source_uuid).await?;
        let mut group = requested.clone();
        let mut removed = RemovedArtifacts::default();

        if group.pools.len() < MIN_POOL_GROUP_MEMBERS {
            warn!(
                uuid = %baseline.source_uuid,
                members = group.pools.len(),
                "Pool group below minimum membership, dissolving"
            );
            removed.pools.extend(baseline.pools.iter().cloned());
            removed.pool_groups.push(baseline);
            return Ok((None, removed));
        }

        adopt_by_name(&mut group.pools, &baseline.pools);
        let members = diff(&group.pools, &baseline.pools);
        for pool in group.pools.iter_mut().filter(|p| p.source_uuid.is_empty()) {
            self.pools.ensure(pool).await?;
        }
        removed.pools = members.removed;

        let fresh = self.groups.modify(&group).await?;
        info!(
            uuid = %fresh.source_uuid,
            added = members.added.len(),
            removed = removed.pools.len(),
            "Pool group membership reconciled"
        );
        Ok((Some(fresh), removed))
    }
}

fn check_membership(group: &PoolGroup) -> Result<()> {
    if group.pools.len() < MIN_POOL_GROUP_MEMBERS {
        return Err(LbError::validation(format!(
            "pool group '{}' needs at least {} members, got {}",
            group.name,
            MIN_POOL_GROUP_MEMBERS,
            group.pools.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pool;

    #[test]
    fn test_group_needs_two_members_up_front() {
        let group = PoolGroup::new("g", vec![Pool::new("only")]);
        assert!(matches!(check_membership(&group), Err(LbError::Validation(_))));
        let group = PoolGroup::new("g", vec![Pool::new("a"), Pool::new("b")]);
        assert!(check_membership(&group).is_ok());
    }

    #[test]
    fn test_default_group_name() {
        assert_eq!(default_group_name("shop"), "shop-group");
    }
}

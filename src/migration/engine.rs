use super::artifact::{Migration, MigrationStatus};
use super::{readiness, remap};
use crate::collaborators::{RecordStore, StoreExt};
use crate::error::{LbError, Result};
use crate::lifecycle::{Balancers, LoadBalancer};
use crate::model::{Vendor, VirtualServer, VsStatus};
use chrono::Utc;
use collection_actor::CollectionEntity;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Store key of the staged artifact for a source record.
pub fn migration_key(source_id: &str) -> String {
    format!("migration/{source_id}")
}

/// Two-phase cross-vendor migration: `stage` reads both appliances and records a
/// readiness verdict, `migrate` performs the cutover of a ready artifact.
#[derive(Clone)]
pub struct MigrationEngine {
    balancers: Balancers,
    store: Arc<dyn RecordStore>,
}

impl MigrationEngine {
    pub fn new(balancers: Balancers, store: Arc<dyn RecordStore>) -> Self {
        Self { balancers, store }
    }

    /// Builds the target configuration and runs every readiness check. Nothing is
    /// written to either appliance.
    #[instrument(skip(self), fields(%source_id, %product_code))]
    pub async fn stage(&self, source_id: &str, product_code: &str) -> Result<Migration> {
        let target_vendor = Vendor::from_product_code(product_code)?;
        let stored = self.source_record(source_id).await?;
        if stored.vendor == target_vendor {
            return Err(LbError::validation(format!(
                "virtual server '{}' already runs on {target_vendor}",
                stored.name
            )));
        }
        let source_lb = self.balancers.get(&stored.address)?;
        let target_lb = self.balancers.first_of(target_vendor).ok_or_else(|| {
            LbError::validation(format!("no {target_vendor} appliance is configured"))
        })?;

        let source = source_lb.virtual_servers().refresh(source_id).await?;
        let source_servers = source_lb.virtual_servers().fetch_all().await?;
        let contexts = target_lb.ops().routing_contexts().await?;

        let mut target = remap::remap(&source, target_vendor);
        target.address = target_lb.address().to_string();
        let checks = readiness::evaluate(&source, &target, &contexts, &source_servers);
        let status = if checks.ready() {
            MigrationStatus::Ready
        } else {
            MigrationStatus::NotReady
        };

        let now = Utc::now();
        let migration = Migration {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            source_address: source.address.clone(),
            source_vendor: source.vendor,
            target_vendor,
            target_address: target_lb.address().to_string(),
            status,
            checks,
            target,
            target_id: None,
            created_at: now,
            updated_at: now,
            last_error: None,
        };
        self.save(&migration).await?;

        if status == MigrationStatus::Ready {
            info!(
                migration = %migration.id,
                target = %migration.target_address,
                "Migration staged and ready"
            );
        } else {
            warn!(
                migration = %migration.id,
                failures = ?migration.checks.failures(),
                "Migration staged, not ready"
            );
        }
        Ok(migration)
    }

    /// Cuts the source over to the staged target configuration.
    ///
    /// Refused with [`LbError::MigrationBlocked`] unless the staged artifact is ready and
    /// the source is not already migrating or migrated. A failure part way stops the
    /// remaining steps; the migration is marked failed and the source keeps the last
    /// status that was set.
    #[instrument(skip(self), fields(%source_id))]
    pub async fn migrate(&self, source_id: &str) -> Result<Migration> {
        let mut migration = self
            .staged(source_id)
            .await?
            .ok_or_else(|| {
                LbError::blocked(format!("virtual server {source_id} has not been staged"))
            })?;
        if !migration.ready() {
            return Err(LbError::blocked(format!(
                "staged migration is not ready: {}",
                migration.checks.failures().join("; ")
            )));
        }
        let source_status = self.store.status(source_id).await?.unwrap_or_default();
        if source_status.is_migration() {
            return Err(LbError::blocked(format!("source is already {source_status}")));
        }
        let source_lb = self.balancers.get(&migration.source_address)?;
        let target_lb = self.balancers.get(&migration.target_address)?;

        migration.touch(MigrationStatus::Migrating);
        self.save(&migration).await?;

        match self.cutover(&mut migration, &source_lb, &target_lb).await {
            Ok(()) => {
                migration.touch(MigrationStatus::Migrated);
                self.save(&migration).await?;
                info!(
                    migration = %migration.id,
                    target_id = ?migration.target_id,
                    "Migration complete"
                );
                Ok(migration)
            }
            Err(e) => {
                error!(migration = %migration.id, error = %e, "Migration failed");
                migration.last_error = Some(e.to_string());
                migration.touch(MigrationStatus::Failed);
                self.save(&migration).await?;
                Err(e)
            }
        }
    }

    pub async fn staged(&self, source_id: &str) -> Result<Option<Migration>> {
        self.store.get_record(&migration_key(source_id)).await
    }

    async fn cutover(
        &self,
        migration: &mut Migration,
        source_lb: &LoadBalancer,
        target_lb: &LoadBalancer,
    ) -> Result<()> {
        let source_id = migration.source_id.clone();
        self.store.set_status(&source_id, VsStatus::Migrating).await?;
        let source = self.source_record(&source_id).await?;

        let ops = source_lb.ops();
        ops.set_virtual_server_enabled(&source.source_uuid, false).await?;
        for peer in &migration.checks.dependency.peers {
            ops.set_virtual_server_enabled(&peer.source_uuid, false).await?;
            info!(peer = %peer.name, "Dependency disabled");
        }
        ops.disable_ip_responder(&source.ip).await?;
        info!(ip = %source.ip, "Source VIP silenced");

        let mut source = source_lb.virtual_servers().refresh(&source_id).await?;

        let outcome = target_lb.virtual_servers().create(migration.target.clone()).await?;
        if outcome.record.status == VsStatus::Fail {
            return Err(LbError::MigrationFailed(format!(
                "target create on {} failed: {}",
                target_lb.address(),
                outcome.record.last_error.as_deref().unwrap_or("unknown error")
            )));
        }
        migration.target_id = Some(outcome.record.id.clone());
        migration.target = outcome.record;

        source.status = VsStatus::Migrated;
        self.store.put_record(&source_id, &source).await?;
        self.store.set_status(&source_id, VsStatus::Migrated).await?;
        Ok(())
    }

    async fn source_record(&self, source_id: &str) -> Result<VirtualServer> {
        self.store
            .get_record(source_id)
            .await?
            .ok_or_else(|| LbError::not_found(VirtualServer::KIND, source_id))
    }

    async fn save(&self, migration: &Migration) -> Result<()> {
        self.store
            .put_record(&migration_key(&migration.source_id), migration)
            .await
    }
}

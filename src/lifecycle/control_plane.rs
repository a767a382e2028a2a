use super::{Balancers, LoadBalancer, MutationJob, MutationWorkers};
use crate::adapters::Resource;
use crate::collaborators::{Ipam, RecordStore, StoreExt};
use crate::config::ControlPlaneConfig;
use crate::coordinator::{FetchCoordinator, FetchReport};
use crate::error::{LbError, Result};
use crate::migration::{Migration, MigrationEngine};
use crate::model::{VirtualServer, VsStatus};
use crate::orchestrator::MutationOutcome;
use crate::vendor::rpc::Authenticator;
use collection_actor::CollectionEntity;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// The running control plane: one [`LoadBalancer`] per configured target, the
/// background mutation workers, the multi-target fetch coordinator and the migration
/// engine.
///
/// Mutations of the same named resource on the same appliance are not serialized here.
/// Callers must not run two of them at once.
///
/// ```ignore
/// let plane = ControlPlane::start(config, authenticator, ipam, store).await?;
/// let outcome = plane.create(vs).await?;
/// let report = plane.fetch_all_targets().await;
/// plane.shutdown().await?;
/// ```
pub struct ControlPlane {
    balancers: Balancers,
    store: Arc<dyn RecordStore>,
    coordinator: FetchCoordinator,
    migrations: MigrationEngine,
    workers: MutationWorkers,
    handles: Vec<JoinHandle<()>>,
}

impl ControlPlane {
    /// Connects to every configured target and loads its caches. Any target that cannot
    /// be reached fails the start.
    #[instrument(skip_all, fields(targets = config.targets.len()))]
    pub async fn start(
        config: ControlPlaneConfig,
        authenticator: Arc<dyn Authenticator>,
        ipam: Arc<dyn Ipam>,
        store: Arc<dyn RecordStore>,
    ) -> Result<Self> {
        config.validate()?;

        let mut balancers = Vec::with_capacity(config.targets.len());
        let mut handles = Vec::new();
        for target in &config.targets {
            let (balancer, actor_handles) = LoadBalancer::connect(
                target,
                authenticator.clone(),
                ipam.clone(),
                store.clone(),
                &config,
            )
            .await?;
            balancers.push(Arc::new(balancer));
            handles.extend(actor_handles);
        }
        let balancers = Balancers::new(balancers);

        let plane = Self {
            coordinator: FetchCoordinator::from_settings(&config.fetch),
            migrations: MigrationEngine::new(balancers.clone(), store.clone()),
            workers: MutationWorkers::start(&config.workers, store.clone()),
            balancers,
            store,
            handles,
        };
        info!(targets = plane.balancers.len(), "Control plane started");
        Ok(plane)
    }

    pub fn balancers(&self) -> &Balancers {
        &self.balancers
    }

    pub fn balancer(&self, address: &str) -> Result<Arc<LoadBalancer>> {
        self.balancers.get(address)
    }

    pub async fn create(&self, record: VirtualServer) -> Result<MutationOutcome<VirtualServer>> {
        let balancer = self.target_of(&record).await?;
        balancer.virtual_servers().create(record).await
    }

    pub async fn modify(&self, record: &VirtualServer) -> Result<MutationOutcome<VirtualServer>> {
        let balancer = self.target_of(record).await?;
        balancer.virtual_servers().modify(record).await
    }

    /// Deletes a managed virtual server by record id.
    pub async fn delete(&self, id: &str) -> Result<MutationOutcome<VirtualServer>> {
        let stored = self.stored(id).await?;
        let balancer = self.balancers.get(&stored.address)?;
        balancer.virtual_servers().delete(&stored).await
    }

    pub async fn fetch(&self, address: &str, uuid: &str) -> Result<VirtualServer> {
        self.balancers.get(address)?.virtual_servers().fetch(uuid).await
    }

    /// Lists virtual servers on every target at once.
    pub async fn fetch_all_targets(&self) -> FetchReport<VirtualServer> {
        let targets: Vec<Arc<LoadBalancer>> = self.balancers.iter().cloned().collect();
        self.coordinator.fetch_all(targets).await
    }

    /// Queues a create and returns the record id to poll with [`ControlPlane::status`].
    pub async fn submit_create(&self, mut record: VirtualServer) -> Result<String> {
        let balancer = self.target_of(&record).await?;
        record.vendor = balancer.vendor();
        record.address = balancer.address().to_string();
        record.validate()?;
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        self.store.set_status(&id, VsStatus::Creating).await?;
        self.workers.submit(MutationJob::Create { balancer, record }).await?;
        Ok(id)
    }

    pub async fn submit_modify(&self, mut record: VirtualServer) -> Result<String> {
        let balancer = self.target_of(&record).await?;
        if record.id.is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let id = record.id.clone();
        self.store.set_status(&id, VsStatus::Updating).await?;
        self.workers.submit(MutationJob::Modify { balancer, record }).await?;
        Ok(id)
    }

    pub async fn submit_delete(&self, id: &str) -> Result<()> {
        let record = self.stored(id).await?;
        let balancer = self.balancers.get(&record.address)?;
        self.store.set_status(id, VsStatus::Deleting).await?;
        self.workers.submit(MutationJob::Delete { balancer, record }).await
    }

    /// `None` once a delete has completed, or for an id never seen.
    pub async fn status(&self, id: &str) -> Result<Option<VsStatus>> {
        self.store.status(id).await
    }

    pub async fn record(&self, id: &str) -> Result<Option<VirtualServer>> {
        self.store.get_record(id).await
    }

    pub async fn stage(&self, source_id: &str, product_code: &str) -> Result<Migration> {
        self.migrations.stage(source_id, product_code).await
    }

    pub async fn migrate(&self, source_id: &str) -> Result<Migration> {
        self.migrations.migrate(source_id).await
    }

    pub async fn migration(&self, source_id: &str) -> Result<Option<Migration>> {
        self.migrations.staged(source_id).await
    }

    /// Drains the mutation queue, then stops every cache actor.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down control plane...");
        self.workers.shutdown().await;

        // Cache actors stop once the last adapter holding their client is gone.
        drop(self.migrations);
        drop(self.balancers);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Cache actor failed: {:?}", e);
                return Err(LbError::Shutdown(e.to_string()));
            }
        }
        info!("Control plane shutdown complete.");
        Ok(())
    }

    /// The appliance a record belongs to: its own address, else the one it was stored
    /// with.
    async fn target_of(&self, record: &VirtualServer) -> Result<Arc<LoadBalancer>> {
        if !record.address.is_empty() {
            return self.balancers.get(&record.address);
        }
        if !record.id.is_empty() {
            if let Some(stored) = self.store.get_record::<VirtualServer>(&record.id).await? {
                return self.balancers.get(&stored.address);
            }
        }
        Err(LbError::validation(format!(
            "virtual server '{}' names no target appliance",
            record.name
        )))
    }

    async fn stored(&self, id: &str) -> Result<VirtualServer> {
        self.store
            .get_record(id)
            .await?
            .ok_or_else(|| LbError::not_found(VirtualServer::KIND, id))
    }
}

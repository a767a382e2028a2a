use crate::adapters::{AdapterSet, CacheClients};
use crate::collaborators::{Ipam, RecordStore};
use crate::config::{ControlPlaneConfig, TargetConfig};
use crate::error::{LbError, Result};
use crate::model::Vendor;
use crate::orchestrator::{
    Collaborators, PoolGroupOrchestrator, PoolOrchestrator, VirtualServerOrchestrator,
};
use crate::reconcile::DependencyCleanup;
use crate::retry::RetryConfig;
use crate::vendor::avi::{self, AviOps};
use crate::vendor::netscaler::{self, NetscalerOps};
use crate::vendor::rpc::{Authenticator, VendorSession};
use crate::vendor::session::ManagedSession;
use crate::vendor::ApplianceOps;
use collection_actor::{CollectionActor, CollectionClient, CollectionEntity};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// Everything the control plane holds for one appliance: the session, the collection
/// caches behind the adapters, and the orchestrators built on them.
pub struct LoadBalancer {
    address: String,
    vendor: Vendor,
    adapters: AdapterSet,
    ops: Arc<dyn ApplianceOps>,
    virtual_servers: VirtualServerOrchestrator,
}

fn spawn_cache<T: CollectionEntity>(
    buffer: usize,
    handles: &mut Vec<JoinHandle<()>>,
) -> CollectionClient<T> {
    let (actor, client) = CollectionActor::<T>::new(buffer);
    handles.push(tokio::spawn(actor.run()));
    client
}

impl LoadBalancer {
    /// Logs in, starts one cache actor per resource type and loads every cache.
    ///
    /// The returned handles finish once every clone of this balancer's adapters is
    /// dropped.
    #[instrument(skip_all, fields(target = %target.address, vendor = %target.vendor))]
    pub async fn connect(
        target: &TargetConfig,
        authenticator: Arc<dyn Authenticator>,
        ipam: Arc<dyn Ipam>,
        store: Arc<dyn RecordStore>,
        config: &ControlPlaneConfig,
    ) -> Result<(Self, Vec<JoinHandle<()>>)> {
        let session = ManagedSession::connect(
            target.address.clone(),
            target.credentials(),
            authenticator,
            RetryConfig::from(&config.retry),
        )
        .await
        .map_err(|e| LbError::appliance(target.vendor, e))?;
        let session: Arc<dyn VendorSession> = Arc::new(session);

        let buffer = config.cache.buffer_size;
        let mut handles = Vec::with_capacity(6);
        let caches = CacheClients {
            certificates: spawn_cache(buffer, &mut handles),
            health_monitors: spawn_cache(buffer, &mut handles),
            persistence: spawn_cache(buffer, &mut handles),
            pools: spawn_cache(buffer, &mut handles),
            pool_groups: spawn_cache(buffer, &mut handles),
            virtual_servers: spawn_cache(buffer, &mut handles),
        };

        let (adapters, ops): (AdapterSet, Arc<dyn ApplianceOps>) = match target.vendor {
            Vendor::Avi => (
                avi::adapters(&target.address, session.clone(), caches),
                Arc::new(AviOps::new(session)),
            ),
            Vendor::Netscaler => (
                netscaler::adapters(&target.address, session.clone(), caches),
                Arc::new(NetscalerOps::new(session)),
            ),
        };

        let cleanup = DependencyCleanup::new(adapters.clone(), ops.clone());
        let pools = PoolOrchestrator::new(&adapters, ops.clone(), cleanup.clone());
        let groups = adapters
            .pool_groups
            .clone()
            .map(|groups| PoolGroupOrchestrator::new(groups, pools.clone(), cleanup.clone()));
        let collaborators = Collaborators {
            ops: ops.clone(),
            ipam,
            store,
        };
        let virtual_servers = VirtualServerOrchestrator::new(
            target.address.clone(),
            &adapters,
            pools,
            groups,
            collaborators,
            cleanup,
        )
        .with_ipam_network(target.ipam_network);

        let balancer = Self {
            address: target.address.clone(),
            vendor: target.vendor,
            adapters,
            ops,
            virtual_servers,
        };
        balancer.populate().await?;
        Ok((balancer, handles))
    }

    /// Loads the caches children first, so parents resolve their references from cache.
    async fn populate(&self) -> Result<()> {
        let a = &self.adapters;
        let certificates = a.certificates.populate().await?;
        let monitors = a.health_monitors.populate().await?;
        let persistence = match &a.persistence {
            Some(adapter) => adapter.populate().await?,
            None => 0,
        };
        let pools = a.pools.populate().await?;
        let groups = match &a.pool_groups {
            Some(adapter) => adapter.populate().await?,
            None => 0,
        };
        let virtual_servers = a.virtual_servers.populate().await?;
        info!(
            target = %self.address,
            certificates,
            monitors,
            persistence,
            pools,
            groups,
            virtual_servers,
            "Caches loaded"
        );
        Ok(())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    pub fn ops(&self) -> &Arc<dyn ApplianceOps> {
        &self.ops
    }

    pub fn virtual_servers(&self) -> &VirtualServerOrchestrator {
        &self.virtual_servers
    }

    pub fn pools(&self) -> &PoolOrchestrator {
        self.virtual_servers.pools()
    }

    pub fn pool_groups(&self) -> Option<&PoolGroupOrchestrator> {
        self.virtual_servers.pool_groups()
    }
}

use super::pool_group::default_group_name;
use super::{ensure_leaf, sync_leaf, MutationOutcome, PoolGroupOrchestrator, PoolOrchestrator};
use crate::adapters::{AdapterSet, Resource, ResourceAdapter};
use crate::collaborators::{Ipam, RecordStore, StoreExt};
use crate::error::{LbError, Result};
use crate::model::{
    find_routing_context, Certificate, Cidr, PoolGroup, RemovedArtifacts, Vendor, VirtualServer,
    VsStatus, MIN_POOL_GROUP_MEMBERS,
};
use crate::reconcile::{adopt_by_name, diff, DependencyCleanup};
use crate::vendor::ApplianceOps;
use collection_actor::CollectionEntity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// The systems a virtual server mutation talks to besides the appliance's collections.
#[derive(Clone)]
pub struct Collaborators {
    pub ops: Arc<dyn ApplianceOps>,
    pub ipam: Arc<dyn Ipam>,
    pub store: Arc<dyn RecordStore>,
}

/// VirtualServer → {pools or pool group, certificates, VIP}, plus IPAM, routing and the
/// persisted record with its status.
#[derive(Clone)]
pub struct VirtualServerOrchestrator {
    vendor: Vendor,
    address: String,
    servers: ResourceAdapter<VirtualServer>,
    certificates: ResourceAdapter<Certificate>,
    pools: PoolOrchestrator,
    groups: Option<PoolGroupOrchestrator>,
    collaborators: Collaborators,
    cleanup: DependencyCleanup,
    ipam_network: Option<Cidr>,
}

impl VirtualServerOrchestrator {
    pub fn new(
        address: impl Into<String>,
        adapters: &AdapterSet,
        pools: PoolOrchestrator,
        groups: Option<PoolGroupOrchestrator>,
        collaborators: Collaborators,
        cleanup: DependencyCleanup,
    ) -> Self {
        Self {
            vendor: adapters.virtual_servers.vendor(),
            address: address.into(),
            servers: adapters.virtual_servers.clone(),
            certificates: adapters.certificates.clone(),
            pools,
            groups,
            collaborators,
            cleanup,
            ipam_network: None,
        }
    }

    /// Network new virtual servers without an IP are allocated from.
    pub fn with_ipam_network(mut self, network: Option<Cidr>) -> Self {
        self.ipam_network = network;
        self
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn ops(&self) -> &Arc<dyn ApplianceOps> {
        &self.collaborators.ops
    }

    pub fn pools(&self) -> &PoolOrchestrator {
        &self.pools
    }

    pub fn pool_groups(&self) -> Option<&PoolGroupOrchestrator> {
        self.groups.as_ref()
    }

    /// Creates the virtual server and everything beneath it.
    ///
    /// Validation problems are returned as `Err` before any call is made. Appliance
    /// failures after that are recorded on the returned record as `fail` with the
    /// vendor's message.
    #[instrument(
        skip(self, vs),
        fields(entity_type = "virtual-server", name = %vs.name, target = %self.address)
    )]
    pub async fn create(&self, mut vs: VirtualServer) -> Result<MutationOutcome<VirtualServer>> {
        if !vs.source_uuid.is_empty() {
            return Err(LbError::validation(format!(
                "virtual server '{}' already exists as {}",
                vs.name, vs.source_uuid
            )));
        }
        self.bind_to_target(&mut vs);
        self.precheck(&vs)?;
        if vs.id.is_empty() {
            vs.id = Uuid::new_v4().to_string();
        }
        vs.status = VsStatus::Creating;
        vs.last_error = None;
        self.persist(&vs).await?;

        let outcome = match self.apply_create(vs.clone()).await {
            Ok(mut created) => {
                created.status = VsStatus::Ready;
                info!(id = %created.id, uuid = %created.source_uuid, "Virtual server created");
                MutationOutcome::new(created)
            }
            Err(e) => {
                error!(id = %vs.id, error = %e, "Virtual server create failed");
                MutationOutcome::new(failed(vs, &e))
            }
        };
        self.persist(&outcome.record).await?;
        Ok(outcome)
    }

    /// Brings an existing virtual server to the requested state, then reclaims every
    /// child it no longer uses.
    #[instrument(
        skip(self, requested),
        fields(entity_type = "virtual-server", name = %requested.name, target = %self.address)
    )]
    pub async fn modify(
        &self,
        requested: &VirtualServer,
    ) -> Result<MutationOutcome<VirtualServer>> {
        let mut vs = requested.clone();
        self.bind_to_target(&mut vs);
        if vs.source_uuid.is_empty() {
            vs.source_uuid = self.lookup(&vs.name).await?;
        }
        self.precheck(&vs)?;
        if vs.id.is_empty() {
            vs.id = Uuid::new_v4().to_string();
        } else if vs.dns_names.is_empty() {
            if let Some(stored) = self.stored(&vs.id).await? {
                vs.dns_names = stored.dns_names;
            }
        }
        vs.status = VsStatus::Updating;
        vs.last_error = None;
        self.collaborators.store.set_status(&vs.id, vs.status).await?;

        let outcome = match self.apply_modify(vs.clone()).await {
            Ok((mut fresh, removed)) => {
                let report = self.cleanup.run(removed.clone()).await;
                fresh.status = if report.has_failures() {
                    VsStatus::PartialSuccess
                } else {
                    VsStatus::Ready
                };
                info!(id = %fresh.id, status = %fresh.status, "Virtual server modified");
                MutationOutcome {
                    record: fresh,
                    removed,
                    warnings: report.warnings(),
                }
            }
            Err(e) => {
                error!(id = %vs.id, error = %e, "Virtual server modify failed");
                MutationOutcome::new(failed(vs, &e))
            }
        };
        self.persist(&outcome.record).await?;
        Ok(outcome)
    }

    /// Deletes the virtual server as it currently is on the appliance, then its orphaned
    /// children, its DNS names and its record.
    #[instrument(
        skip(self, vs),
        fields(entity_type = "virtual-server", name = %vs.name, target = %self.address)
    )]
    pub async fn delete(&self, vs: &VirtualServer) -> Result<MutationOutcome<VirtualServer>> {
        let mut vs = vs.clone();
        self.bind_to_target(&mut vs);
        if vs.source_uuid.is_empty() {
            vs.source_uuid = self.lookup(&vs.name).await?;
        }
        if !vs.id.is_empty() {
            if vs.dns_names.is_empty() {
                if let Some(stored) = self.stored(&vs.id).await? {
                    vs.dns_names = stored.dns_names;
                }
            }
            self.collaborators.store.set_status(&vs.id, VsStatus::Deleting).await?;
        }

        match self.apply_delete(&vs).await {
            Ok(outcome) => {
                if !vs.id.is_empty() {
                    self.collaborators.store.delete(&vs.id).await?;
                }
                info!(id = %vs.id, warnings = outcome.warnings.len(), "Virtual server deleted");
                Ok(outcome)
            }
            Err(e) => {
                error!(id = %vs.id, error = %e, "Virtual server delete failed");
                let record = failed(vs, &e);
                if !record.id.is_empty() {
                    self.persist(&record).await?;
                }
                Ok(MutationOutcome::new(record))
            }
        }
    }

    pub async fn fetch(&self, uuid: &str) -> Result<VirtualServer> {
        self.servers.fetch(uuid).await
    }

    pub async fn fetch_all(&self) -> Result<Vec<VirtualServer>> {
        self.servers.fetch_all().await
    }

    /// Re-reads a managed virtual server from the appliance and stores the result.
    pub async fn refresh(&self, id: &str) -> Result<VirtualServer> {
        let stored = self
            .stored(id)
            .await?
            .ok_or_else(|| LbError::not_found(VirtualServer::KIND, id))?;
        let mut fresh = self.servers.fetch(&stored.source_uuid).await?;
        fresh.carry_local_fields(&stored);
        self.collaborators.store.put_record(id, &fresh).await?;
        Ok(fresh)
    }

    /// The persisted record of a managed virtual server.
    pub async fn stored(&self, id: &str) -> Result<Option<VirtualServer>> {
        self.collaborators.store.get_record(id).await
    }

    /// Cached virtual servers of this appliance.
    pub async fn snapshot(&self) -> Result<Vec<VirtualServer>> {
        self.servers.snapshot().await
    }

    async fn apply_create(&self, mut vs: VirtualServer) -> Result<VirtualServer> {
        if vs.ip.is_empty() {
            let network = self.ipam_network.as_ref().ok_or_else(|| {
                LbError::validation(format!("no IPAM network configured for {}", self.address))
            })?;
            vs.ip = self.collaborators.ipam.fetch_ip(network).await?;
            info!(ip = %vs.ip, %network, "Allocated VIP");
        }
        vs.routing_context = Some(self.routing_context_for(&vs.ip).await?);
        vs.dns_names = self
            .collaborators
            .ipam
            .create(&vs.ip, self.vendor.product_code(), &vs.dns_names)
            .await?;

        self.ensure_pools(&mut vs).await?;
        for certificate in &mut vs.certificates {
            ensure_leaf(&self.certificates, self.collaborators.ops.as_ref(), certificate).await?;
        }

        let requested = vs.clone();
        self.servers.create(&mut vs).await?;
        vs.carry_local_fields(&requested);
        Ok(vs)
    }

    async fn apply_modify(
        &self,
        mut vs: VirtualServer,
    ) -> Result<(VirtualServer, RemovedArtifacts)> {
        let baseline = self.servers.fetch(&vs.source_uuid).await?;
        let mut removed = RemovedArtifacts::default();

        adopt_by_name(&mut vs.pools, &baseline.pools);
        let pools = diff(&vs.pools, &baseline.pools);
        let existing: HashSet<String> =
            pools.updated.iter().map(|p| p.source_uuid.clone()).collect();
        for pool in &mut vs.pools {
            if existing.contains(&pool.source_uuid) {
                let (fresh, dropped) = self.pools.apply_modify(pool).await?;
                *pool = fresh;
                removed.merge(dropped);
            } else {
                self.pools.ensure(pool).await?;
            }
        }
        removed.pools.extend(pools.removed);

        self.reconcile_group(&mut vs, &baseline, &mut removed).await?;

        adopt_by_name(&mut vs.certificates, &baseline.certificates);
        let certificates = diff(&vs.certificates, &baseline.certificates);
        let existing: HashSet<String> = certificates
            .updated
            .iter()
            .map(|c| c.source_uuid.clone())
            .collect();
        for certificate in &mut vs.certificates {
            let exists = existing.contains(&certificate.source_uuid);
            let ops = self.collaborators.ops.as_ref();
            sync_leaf(&self.certificates, ops, certificate, exists).await?;
        }
        removed.certificates.extend(certificates.removed);

        if vs.ip.is_empty() {
            vs.ip = baseline.ip.clone();
        }
        if vs.ip != baseline.ip {
            vs.routing_context = Some(self.routing_context_for(&vs.ip).await?);
            vs.dns_names = self
                .collaborators
                .ipam
                .modify(&vs.ip, self.vendor.product_code(), &vs.dns_names)
                .await?;
            info!(from = %baseline.ip, to = %vs.ip, "VIP moved");
        } else if vs.routing_context.is_none() {
            vs.routing_context = baseline.routing_context.clone();
        }

        let mut fresh = self.servers.modify(&vs).await?;
        fresh.carry_local_fields(&vs);

        let live_pools: Vec<&str> = fresh.pools.iter().map(|p| p.source_uuid.as_str()).collect();
        removed.retain_unreferenced_pools(&live_pools);
        let live_certificates: Vec<&str> =
            fresh.certificates.iter().map(|c| c.source_uuid.as_str()).collect();
        removed.retain_unreferenced_certificates(&live_certificates);
        Ok((fresh, removed))
    }

    async fn apply_delete(&self, vs: &VirtualServer) -> Result<MutationOutcome<VirtualServer>> {
        let mut warnings = Vec::new();
        let mut removed = RemovedArtifacts::default();

        let mut record = match self.servers.fetch(&vs.source_uuid).await {
            Ok(current) => {
                self.servers.delete(&current).await?;
                removed.pools = current.pools.clone();
                removed.pool_groups.extend(current.pool_group.clone());
                removed.certificates = current.certificates.clone();
                current
            }
            Err(e) if e.is_not_found() => {
                warnings.push(format!("virtual server '{}' was already gone", vs.name));
                vs.clone()
            }
            Err(e) => return Err(e),
        };
        record.carry_local_fields(vs);

        let report = self.cleanup.run(removed.clone()).await;
        warnings.extend(report.warnings());

        if !vs.dns_names.is_empty() {
            if let Err(e) = self.collaborators.ipam.delete(&vs.dns_names).await {
                warn!(error = %e, "DNS names not released");
                warnings.push(format!("DNS names {:?} not released: {e}", vs.dns_names));
            }
        }

        record.status = if report.has_failures() {
            VsStatus::PartialSuccess
        } else {
            VsStatus::Ready
        };
        Ok(MutationOutcome {
            record,
            removed,
            warnings,
        })
    }

    /// Single pool, or a pool group over two or more on vendors that have one.
    async fn ensure_pools(&self, vs: &mut VirtualServer) -> Result<()> {
        match &self.groups {
            Some(groups) if vs.pools.len() >= MIN_POOL_GROUP_MEMBERS => {
                let mut group = vs
                    .pool_group
                    .take()
                    .unwrap_or_else(|| PoolGroup::new(default_group_name(&vs.name), Vec::new()));
                group.pools = vs.pools.clone();
                groups.ensure(&mut group).await?;
                vs.pools = group.pools.clone();
                vs.pool_group = Some(group);
            }
            _ => {
                vs.pool_group = None;
                for pool in &mut vs.pools {
                    self.pools.ensure(pool).await?;
                }
            }
        }
        Ok(())
    }

    async fn reconcile_group(
        &self,
        vs: &mut VirtualServer,
        baseline: &VirtualServer,
        removed: &mut RemovedArtifacts,
    ) -> Result<()> {
        let Some(groups) = &self.groups else {
            vs.pool_group = None;
            return Ok(());
        };
        let wants_group = vs.pools.len() >= MIN_POOL_GROUP_MEMBERS;
        match (&baseline.pool_group, wants_group) {
            (Some(current), true) => {
                let mut group = vs.pool_group.take().unwrap_or_else(|| current.clone());
                group.source_uuid = current.source_uuid.clone();
                group.pools = vs.pools.clone();
                let (fresh, dropped) = groups.apply_membership(&group).await?;
                removed.merge(dropped);
                vs.pool_group = fresh;
            }
            (Some(current), false) => {
                info!(group = %current.name, "Single pool left, retiring pool group");
                removed.pool_groups.push(current.clone());
                vs.pool_group = None;
            }
            (None, true) => {
                let mut group = vs
                    .pool_group
                    .take()
                    .unwrap_or_else(|| PoolGroup::new(default_group_name(&vs.name), Vec::new()));
                group.pools = vs.pools.clone();
                groups.ensure(&mut group).await?;
                vs.pool_group = Some(group);
            }
            (None, false) => vs.pool_group = None,
        }
        Ok(())
    }

    async fn routing_context_for(&self, ip: &str) -> Result<String> {
        let contexts = self.collaborators.ops.routing_contexts().await?;
        find_routing_context(&contexts, ip)
            .map(|ctx| ctx.name.clone())
            .ok_or_else(|| {
                LbError::validation(format!("no routing context on {} reaches {ip}", self.address))
            })
    }

    async fn lookup(&self, name: &str) -> Result<String> {
        self.servers
            .fetch_by_name(name)
            .await?
            .map(|found| found.source_uuid)
            .ok_or_else(|| LbError::not_found(VirtualServer::KIND, name))
    }

    fn bind_to_target(&self, vs: &mut VirtualServer) {
        vs.vendor = self.vendor;
        vs.address = self.address.clone();
    }

    fn precheck(&self, vs: &VirtualServer) -> Result<()> {
        vs.validate()?;
        for pool in vs.pools.iter().filter(|p| p.source_uuid.is_empty()) {
            pool.validate()?;
        }
        if vs.pool_group.is_some() && self.groups.is_none() {
            return Err(LbError::validation(format!(
                "{} has no pool group object; bind the pools of '{}' directly",
                self.vendor, vs.name
            )));
        }
        if vs.ip.is_empty() && vs.source_uuid.is_empty() && self.ipam_network.is_none() {
            return Err(LbError::validation(format!(
                "virtual server '{}' has no IP and {} has no IPAM network",
                vs.name, self.address
            )));
        }
        Ok(())
    }

    async fn persist(&self, vs: &VirtualServer) -> Result<()> {
        self.collaborators.store.put_record(&vs.id, vs).await?;
        self.collaborators.store.set_status(&vs.id, vs.status).await
    }
}

fn failed(mut vs: VirtualServer, error: &LbError) -> VirtualServer {
    vs.status = VsStatus::Fail;
    vs.last_error = Some(error.to_string());
    vs
}

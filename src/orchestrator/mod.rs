//! # Cascade Orchestrators
//!
//! Hierarchical Create/Modify/Delete. Each level diffs its children against the
//! appliance's current state, drives the child orchestrator or adapter for every
//! partition, and only then writes itself. Child orchestrators are built first and
//! handed to their parent at construction.
//!
//! Within one invocation every child mutation completes before its parent references
//! it. Two callers mutating the same named resource concurrently race; serialize at the
//! caller.

mod pool;
mod pool_group;
mod virtual_server;

pub use pool::PoolOrchestrator;
pub use pool_group::{default_group_name, PoolGroupOrchestrator};
pub use virtual_server::{Collaborators, VirtualServerOrchestrator};

use crate::adapters::{Resource, ResourceAdapter};
use crate::error::Result;
use crate::model::RemovedArtifacts;
use crate::vendor::ApplianceOps;
use serde::Serialize;

/// What a mutation did: the refreshed record, the children it dropped, and every
/// non-fatal problem met on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationOutcome<T> {
    pub record: T,
    pub removed: RemovedArtifacts,
    pub warnings: Vec<String>,
}

impl<T> MutationOutcome<T> {
    pub fn new(record: T) -> Self {
        Self {
            record,
            removed: RemovedArtifacts::default(),
            warnings: Vec::new(),
        }
    }
}

/// Makes a leaf child exist on the appliance.
///
/// A child with an identity is attached as found. A default object is looked up by
/// name, never created over. Anything else is created, which the adapter turns into a
/// reuse when the name is already taken.
pub(crate) async fn ensure_leaf<R: Resource>(
    adapter: &ResourceAdapter<R>,
    ops: &dyn ApplianceOps,
    record: &mut R,
) -> Result<()> {
    if !record.source_uuid().is_empty() {
        let uuid = record.source_uuid().to_string();
        *record = adapter.resolve(&uuid).await?;
        return Ok(());
    }
    if ops.is_default(R::KIND, record.name()) {
        let found = adapter.fetch_by_name(record.name()).await?;
        if let Some(found) = found {
            *record = found;
            return Ok(());
        }
    }
    adapter.create(record).await
}

/// Pushes a child that already exists to its requested state. Defaults and immutable
/// children are attached unchanged.
pub(crate) async fn sync_leaf<R: Resource>(
    adapter: &ResourceAdapter<R>,
    ops: &dyn ApplianceOps,
    record: &mut R,
    exists: bool,
) -> Result<()> {
    if exists && !record.is_immutable() && !ops.is_default(R::KIND, record.name()) {
        *record = adapter.modify(record).await?;
        return Ok(());
    }
    ensure_leaf(adapter, ops, record).await
}

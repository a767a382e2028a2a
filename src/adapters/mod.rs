//! # Vendor Adapters
//!
//! One generic [`ResourceAdapter`] serves every resource type on every vendor. What
//! differs per vendor × resource is isolated behind [`VendorDriver`]: the raw appliance
//! calls plus the ETL between the neutral record and the vendor's wire schema.

mod adapter;

pub use adapter::ResourceAdapter;

use crate::error::Result;
use crate::model::{
    Certificate, HealthMonitor, PersistenceProfile, Pool, PoolGroup, Vendor, VirtualServer,
};
use async_trait::async_trait;
use collection_actor::{CollectionClient, CollectionEntity};

/// Every adapter of one appliance session.
///
/// `persistence` and `pool_groups` are absent on vendors without standalone objects for
/// them.
#[derive(Clone)]
pub struct AdapterSet {
    pub certificates: ResourceAdapter<Certificate>,
    pub health_monitors: ResourceAdapter<HealthMonitor>,
    pub persistence: Option<ResourceAdapter<PersistenceProfile>>,
    pub pools: ResourceAdapter<Pool>,
    pub pool_groups: Option<ResourceAdapter<PoolGroup>>,
    pub virtual_servers: ResourceAdapter<VirtualServer>,
}

/// One collection cache client per resource type, handed to a vendor's driver wiring.
pub struct CacheClients {
    pub certificates: CollectionClient<Certificate>,
    pub health_monitors: CollectionClient<HealthMonitor>,
    pub persistence: CollectionClient<PersistenceProfile>,
    pub pools: CollectionClient<Pool>,
    pub pool_groups: CollectionClient<PoolGroup>,
    pub virtual_servers: CollectionClient<VirtualServer>,
}

/// A vendor-neutral record that can be cached and pushed to an appliance.
pub trait Resource: CollectionEntity + PartialEq {
    /// Fills numeric defaults where the caller supplied 0.
    fn apply_defaults(&mut self) {}

    /// Checks run before any appliance call.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// The appliance object may be reused but never rewritten.
    fn is_immutable(&self) -> bool {
        false
    }
}

/// Raw appliance operations and ETL for one resource type on one vendor.
///
/// Drivers never touch the collection cache; [`ResourceAdapter`] keeps it current.
#[async_trait]
pub trait VendorDriver<R: Resource>: Send + Sync {
    fn vendor(&self) -> Vendor;

    /// Creates the object and returns the identity the appliance assigned.
    async fn create(&self, record: &R) -> Result<String>;

    async fn fetch(&self, uuid: &str) -> Result<R>;

    /// One entry per appliance object, so a single unmappable object does not fail the
    /// whole listing.
    async fn fetch_all(&self) -> Result<Vec<Result<R>>>;

    /// Resolves a declared name to the appliance identity.
    async fn lookup(&self, name: &str) -> Result<Option<String>>;

    /// Re-reads the current wire object, merges the requested fields into it and writes
    /// it back, so fields the neutral model does not know survive.
    async fn update(&self, uuid: &str, requested: &R) -> Result<()>;

    async fn delete(&self, uuid: &str) -> Result<()>;
}

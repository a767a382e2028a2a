//! # CollectionEntity Trait
//!
//! The `CollectionEntity` trait is the contract every cached resource record (certificate,
//! health monitor, pool, virtual server, …) satisfies so a generic `CollectionActor` can
//! index it. A record exposes two identities:
//!
//! - its **source uuid**, assigned by the appliance on first create and immutable after;
//! - its **name**, the friendly identifier a caller declares.
//!
//! The actor keeps both indices consistent. The uuid index is authoritative for identity,
//! the name index for idempotent lookup by declared name.

use std::fmt::Debug;

/// Trait that any cached record must implement to be managed by a `CollectionActor`.
///
/// # Architecture Note
/// The cache is written once and reused for every resource type. The only things it
/// needs from a record are its two identities and a short kind label used in logs.
pub trait CollectionEntity: Clone + Send + Sync + Debug + 'static {
    /// Short label for the resource type (e.g. `"pool"`), used as the `entity_type`
    /// field in traces.
    const KIND: &'static str;

    /// Friendly name declared by the caller.
    fn name(&self) -> &str;

    /// Appliance-assigned identifier. Empty until the first successful create.
    fn source_uuid(&self) -> &str;
}

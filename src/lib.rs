//! # Load-Balancer Control Plane
//!
//! > **One vocabulary for virtual servers, whatever appliance runs them.**
//!
//! Callers describe a virtual server, its pools, health monitors, persistence and
//! certificates in vendor-neutral terms. The control plane creates, modifies, deletes and
//! reads that hierarchy on Avi or Netscaler appliances, reclaims children nothing uses
//! anymore, and moves a virtual server from one vendor to the other.
//!
//! ## Design
//!
//! ### One adapter, many drivers
//! [`ResourceAdapter<R>`](adapters::ResourceAdapter) is written once. Everything that
//! differs per vendor × resource lives behind [`VendorDriver<R>`](adapters::VendorDriver):
//! the raw appliance calls plus the ETL between the neutral record and a typed wire schema.
//!
//! ### Caches are actors
//! Every appliance session gets one collection actor per resource type (see the
//! `collection-actor` crate). Adapters keep them current after each appliance call; nothing
//! else writes to them.
//!
//! ### Children first, orphans last
//! Orchestrators make leaf children exist before the parent refers to them, and hand what
//! a mutation dropped to [`DependencyCleanup`](reconcile::DependencyCleanup), which deletes
//! an object only when no live parent still points at it.
//!
//! ### Failure is data
//! Appliance failures during a mutation end in `record.status = Fail` with `last_error`
//! set. Cleanup problems come back as warnings, readiness problems as check results.
//! Only malformed requests are returned as `Err`, before any appliance call.
//!
//! ## Module Tour
//!
//! - [`model`]: the neutral records and the status state machine.
//! - [`vendor`]: sessions, wire schemas, ETL tables and drivers for each vendor.
//! - [`adapters`]: the generic adapter and the driver contract.
//! - [`reconcile`]: the diff engine and dependency cleanup.
//! - [`orchestrator`]: create/modify/delete cascades for pools, pool groups and virtual servers.
//! - [`coordinator`]: bounded, time-boxed FetchAll across many appliances.
//! - [`migration`]: stage and migrate between vendors.
//! - [`collaborators`]: IPAM and record store interfaces.
//! - [`lifecycle`]: wiring, background workers and shutdown.
//! - [`mock`]: in-memory appliances and IPAM for the demo and the tests.
//!
//! ## Running the Demo
//!
//! ```bash
//! RUST_LOG=info cargo run
//! ```

pub mod adapters;
pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod migration;
pub mod mock;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
pub mod retry;
pub mod vendor;

pub use error::{LbError, Result};

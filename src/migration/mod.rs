//! # Cross-Vendor Migration
//!
//! `stage` remaps a source virtual server onto the target vendor's vocabulary and runs
//! the readiness checks; `migrate` performs the cutover of a ready artifact. Staging
//! never changes an appliance. A cutover is never rolled back.

mod artifact;
mod engine;
pub mod readiness;
pub mod remap;

pub use artifact::{
    CheckResult, DependencyPeer, DependencyStatus, Migration, MigrationStatus, PoolReadiness,
    ReadinessChecks,
};
pub use engine::{migration_key, MigrationEngine};

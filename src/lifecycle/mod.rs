//! # Runtime Wiring
//!
//! Builds one [`LoadBalancer`] per configured appliance and runs them behind the
//! [`ControlPlane`], which also owns the background mutation workers.

mod control_plane;
mod load_balancer;
mod registry;
pub mod tracing;
mod worker;

pub use control_plane::ControlPlane;
pub use load_balancer::LoadBalancer;
pub use registry::Balancers;
pub use worker::{MutationJob, MutationWorkers};

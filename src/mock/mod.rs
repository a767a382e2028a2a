//! # Appliance Simulators
//!
//! In-memory stand-ins for the systems behind the RPC boundary: appliances speaking
//! either vendor dialect, an authenticator that logs into them, and an IPAM. The demo
//! binary and the integration tests run the whole control plane against these.

mod appliance;
mod ipam;

pub use appliance::{Method, MockAppliance, MockFabric};
pub use ipam::StaticIpam;

//! Interfaces of the systems the control plane depends on but does not own: address
//! management with DNS, and the record store.

mod ipam;
mod store;

pub use ipam::Ipam;
pub use store::{InMemoryStore, RecordStore, StoreExt};

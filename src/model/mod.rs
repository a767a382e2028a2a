//! Vendor-neutral value records. Vendor identity is a field, never a subtype.

pub mod certificate;
pub mod monitor;
pub mod network;
pub mod persistence;
pub mod pool;
pub mod pool_group;
pub mod removed;
pub mod status;
pub mod vendor;
pub mod virtual_server;

pub use certificate::*;
pub use monitor::*;
pub use network::*;
pub use persistence::*;
pub use pool::*;
pub use pool_group::*;
pub use removed::*;
pub use status::*;
pub use vendor::*;
pub use virtual_server::*;

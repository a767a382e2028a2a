//! Pure diffing and the orphan reclamation that follows a mutation.

pub mod cleanup;
pub mod diff;

pub use cleanup::{CleanupReport, DependencyCleanup};
pub use diff::{adopt_by_name, diff, Identity, Partition};

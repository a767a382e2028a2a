use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of the last mutation on a virtual server, persisted separately from the
/// record so callers can poll an in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum VsStatus {
    #[default]
    Ready,
    Fail,
    PartialSuccess,
    Migrating,
    Migrated,
    Creating,
    Updating,
    Deleting,
}

impl VsStatus {
    pub fn code(self) -> u8 {
        match self {
            VsStatus::Ready => 0,
            VsStatus::Fail => 1,
            VsStatus::PartialSuccess => 2,
            VsStatus::Migrating => 3,
            VsStatus::Migrated => 4,
            VsStatus::Creating => 5,
            VsStatus::Updating => 6,
            VsStatus::Deleting => 7,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => VsStatus::Ready,
            1 => VsStatus::Fail,
            2 => VsStatus::PartialSuccess,
            3 => VsStatus::Migrating,
            4 => VsStatus::Migrated,
            5 => VsStatus::Creating,
            6 => VsStatus::Updating,
            7 => VsStatus::Deleting,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VsStatus::Ready => "ready",
            VsStatus::Fail => "fail",
            VsStatus::PartialSuccess => "partial success",
            VsStatus::Migrating => "migrating",
            VsStatus::Migrated => "migrated",
            VsStatus::Creating => "creating",
            VsStatus::Updating => "updating",
            VsStatus::Deleting => "deleting",
        }
    }

    /// Mutation still running.
    pub fn in_progress(self) -> bool {
        matches!(
            self,
            VsStatus::Creating | VsStatus::Updating | VsStatus::Deleting | VsStatus::Migrating
        )
    }

    /// Either migrating or already migrated.
    pub fn is_migration(self) -> bool {
        self.as_str().contains("migrat")
    }
}

impl fmt::Display for VsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

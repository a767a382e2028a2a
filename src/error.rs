//! Error types for the control plane.

use crate::model::Vendor;
use crate::vendor::rpc::RpcError;
use collection_actor::CacheError;
use thiserror::Error;

/// Errors that can occur anywhere above the vendor session boundary.
#[derive(Debug, Error)]
pub enum LbError {
    /// A vendor value has no counterpart in the neutral vocabulary (or the reverse).
    #[error("{vendor} ETL error: unmappable {field} value '{value}'")]
    Etl {
        vendor: Vendor,
        field: &'static str,
        value: String,
    },

    /// The request is malformed. Raised before any appliance call is made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An appliance call failed; the vendor's own message is carried in `source`.
    #[error("{vendor} appliance call failed: {source}")]
    Appliance {
        vendor: Vendor,
        #[source]
        source: RpcError,
    },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("IPAM error: {0}")]
    Ipam(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cutover refused; nothing was changed on either appliance.
    #[error("Migration blocked: {0}")]
    MigrationBlocked(String),

    /// Cutover started and stopped part way; applied appliance changes stay in place.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mutation queue closed")]
    QueueClosed,

    /// A background task panicked or was cancelled while shutting down.
    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}

impl LbError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn etl(vendor: Vendor, field: &'static str, value: impl Into<String>) -> Self {
        Self::Etl {
            vendor,
            field,
            value: value.into(),
        }
    }

    pub fn appliance(vendor: Vendor, source: RpcError) -> Self {
        Self::Appliance { vendor, source }
    }

    pub fn blocked(msg: impl Into<String>) -> Self {
        Self::MigrationBlocked(msg.into())
    }

    /// True for both a local lookup miss and an appliance 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Appliance {
                    source: RpcError::NotFound(_),
                    ..
                }
        )
    }

    /// True when the appliance reported that the object already exists or is in use.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Appliance {
                source: RpcError::Conflict(_),
                ..
            }
        )
    }

    pub fn is_etl(&self) -> bool {
        matches!(self, Self::Etl { .. })
    }
}

pub type Result<T> = std::result::Result<T, LbError>;

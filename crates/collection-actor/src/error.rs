//! # Cache Errors
//!
//! Errors raised by the collection cache itself. Appliance and ETL failures never reach
//! this layer; they belong to the caller's error type.

/// Errors that can occur within the collection cache.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CacheError {
    #[error("Collection actor closed")]
    ActorClosed,
    #[error("Collection actor dropped response channel")]
    ActorDropped,
    /// A record without a source uuid cannot enter the uuid index.
    #[error("{kind} '{name}' has no source uuid")]
    MissingIdentity { kind: &'static str, name: String },
}

//! # Collection Messages
//!
//! Message types exchanged between a `CollectionClient` and its `CollectionActor`.

use crate::entity::CollectionEntity;
use crate::error::CacheError;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the actor.
pub type Response<T> = oneshot::Sender<Result<T, CacheError>>;

/// Internal message type sent to the actor.
///
/// The variants mirror the lifecycle of a cached collection:
///
/// - **Populate**: replace the whole collection with a fresh full fetch.
/// - **Upsert**: record the outcome of a create, fetch or modify.
/// - **Remove**: drop a record after a delete.
/// - **ByUuid / ByName**: point lookups through either index.
/// - **Snapshot**: every record currently known, used for reference scans.
#[derive(Debug)]
pub enum CollectionRequest<T: CollectionEntity> {
    Populate {
        records: Vec<T>,
        respond_to: Response<usize>,
    },
    Upsert {
        record: T,
        respond_to: Response<()>,
    },
    Remove {
        uuid: String,
        respond_to: Response<Option<T>>,
    },
    ByUuid {
        uuid: String,
        respond_to: Response<Option<T>>,
    },
    ByName {
        name: String,
        respond_to: Response<Option<T>>,
    },
    Snapshot {
        respond_to: Response<Vec<T>>,
    },
}

//! # Collection Client
//!
//! The cloneable, async handle used by adapters and orchestrators to read and update a
//! `CollectionActor`.

use crate::entity::CollectionEntity;
use crate::error::CacheError;
use crate::message::CollectionRequest;
use tokio::sync::{mpsc, oneshot};

/// A type-safe client for interacting with a `CollectionActor`.
///
/// Holds only a channel sender, so cloning is cheap. Every call is one request/response
/// round trip with the actor.
#[derive(Clone)]
pub struct CollectionClient<T: CollectionEntity> {
    sender: mpsc::Sender<CollectionRequest<T>>,
}

impl<T: CollectionEntity> CollectionClient<T> {
    pub fn new(sender: mpsc::Sender<CollectionRequest<T>>) -> Self {
        Self { sender }
    }

    /// Replaces the whole collection, returning the number of records accepted.
    pub async fn populate(&self, records: Vec<T>) -> Result<usize, CacheError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CollectionRequest::Populate {
                records,
                respond_to,
            })
            .await
            .map_err(|_| CacheError::ActorClosed)?;
        response.await.map_err(|_| CacheError::ActorDropped)?
    }

    pub async fn upsert(&self, record: T) -> Result<(), CacheError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CollectionRequest::Upsert { record, respond_to })
            .await
            .map_err(|_| CacheError::ActorClosed)?;
        response.await.map_err(|_| CacheError::ActorDropped)?
    }

    pub async fn remove(&self, uuid: &str) -> Result<Option<T>, CacheError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CollectionRequest::Remove {
                uuid: uuid.to_string(),
                respond_to,
            })
            .await
            .map_err(|_| CacheError::ActorClosed)?;
        response.await.map_err(|_| CacheError::ActorDropped)?
    }

    pub async fn by_uuid(&self, uuid: &str) -> Result<Option<T>, CacheError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CollectionRequest::ByUuid {
                uuid: uuid.to_string(),
                respond_to,
            })
            .await
            .map_err(|_| CacheError::ActorClosed)?;
        response.await.map_err(|_| CacheError::ActorDropped)?
    }

    pub async fn by_name(&self, name: &str) -> Result<Option<T>, CacheError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CollectionRequest::ByName {
                name: name.to_string(),
                respond_to,
            })
            .await
            .map_err(|_| CacheError::ActorClosed)?;
        response.await.map_err(|_| CacheError::ActorDropped)?
    }

    pub async fn snapshot(&self) -> Result<Vec<T>, CacheError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CollectionRequest::Snapshot { respond_to })
            .await
            .map_err(|_| CacheError::ActorClosed)?;
        response.await.map_err(|_| CacheError::ActorDropped)?
    }
}

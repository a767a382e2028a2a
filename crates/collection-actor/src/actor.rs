//! # Collection Actor
//!
//! This module defines the `CollectionActor`, the server half of the cache. It owns both
//! indices of one resource collection and processes requests sequentially, so the
//! indices are never observed half-updated.

use crate::client::CollectionClient;
use crate::entity::CollectionEntity;
use crate::error::CacheError;
use crate::message::CollectionRequest;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The generic actor that caches one resource collection of one appliance.
///
/// # Indices
///
/// * `source` maps source uuid → record and is authoritative for identity.
/// * `system` maps declared name → source uuid. It stores only the uuid, so a name can
///   never resolve to a record that is absent from `source`.
///
/// # Concurrency Model
///
/// One actor per resource type per appliance session. Requests are processed one at a
/// time, which gives single-writer semantics without a lock. Two callers mutating the
/// *same* appliance object concurrently is still a race at the appliance; serializing
/// those is the caller's job.
///
/// ```rust
/// use collection_actor::{CollectionActor, CollectionEntity};
///
/// #[derive(Clone, Debug)]
/// struct Monitor { name: String, uuid: String }
///
/// impl CollectionEntity for Monitor {
///     const KIND: &'static str = "monitor";
///     fn name(&self) -> &str { &self.name }
///     fn source_uuid(&self) -> &str { &self.uuid }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let (actor, client) = CollectionActor::<Monitor>::new(10);
///     tokio::spawn(actor.run());
///
///     client.upsert(Monitor { name: "web".into(), uuid: "hm-1".into() }).await.unwrap();
///     let hit = client.by_name("web").await.unwrap();
///     assert_eq!(hit.unwrap().uuid, "hm-1");
/// }
/// ```
pub struct CollectionActor<T: CollectionEntity> {
    receiver: mpsc::Receiver<CollectionRequest<T>>,
    system: HashMap<String, String>,
    source: HashMap<String, T>,
}

impl<T: CollectionEntity> CollectionActor<T> {
    /// Creates a new `CollectionActor` and its associated `CollectionClient`.
    ///
    /// `buffer_size` is the capacity of the request channel; callers wait when it is full.
    pub fn new(buffer_size: usize) -> (Self, CollectionClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            system: HashMap::new(),
            source: HashMap::new(),
        };
        (actor, CollectionClient::new(sender))
    }

    /// Runs the actor's event loop until every client has been dropped.
    pub async fn run(mut self) {
        let entity_type = T::KIND;
        info!(entity_type, "Collection started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                CollectionRequest::Populate {
                    records,
                    respond_to,
                } => {
                    self.system.clear();
                    self.source.clear();
                    for record in records {
                        if let Err(e) = self.insert(record) {
                            warn!(entity_type, error = %e, "Skipped during populate");
                        }
                    }
                    info!(entity_type, size = self.source.len(), "Populated");
                    let _ = respond_to.send(Ok(self.source.len()));
                }
                CollectionRequest::Upsert { record, respond_to } => {
                    let uuid = record.source_uuid().to_string();
                    let result = self.insert(record);
                    match &result {
                        Ok(()) => debug!(entity_type, %uuid, size = self.source.len(), "Upserted"),
                        Err(e) => warn!(entity_type, error = %e, "Upsert rejected"),
                    }
                    let _ = respond_to.send(result);
                }
                CollectionRequest::Remove { uuid, respond_to } => {
                    let removed = self.source.remove(&uuid);
                    if let Some(record) = &removed {
                        if self.system.get(record.name()) == Some(&uuid) {
                            self.system.remove(record.name());
                        }
                    }
                    debug!(
                        entity_type,
                        %uuid,
                        found = removed.is_some(),
                        size = self.source.len(),
                        "Removed"
                    );
                    let _ = respond_to.send(Ok(removed));
                }
                CollectionRequest::ByUuid { uuid, respond_to } => {
                    let item = self.source.get(&uuid).cloned();
                    debug!(entity_type, %uuid, found = item.is_some(), "ByUuid");
                    let _ = respond_to.send(Ok(item));
                }
                CollectionRequest::ByName { name, respond_to } => {
                    let item = self
                        .system
                        .get(&name)
                        .and_then(|uuid| self.source.get(uuid))
                        .cloned();
                    debug!(entity_type, %name, found = item.is_some(), "ByName");
                    let _ = respond_to.send(Ok(item));
                }
                CollectionRequest::Snapshot { respond_to } => {
                    let items: Vec<T> = self.source.values().cloned().collect();
                    let _ = respond_to.send(Ok(items));
                }
            }
        }

        info!(entity_type, size = self.source.len(), "Shutdown");
    }

    fn insert(&mut self, record: T) -> Result<(), CacheError> {
        let uuid = record.source_uuid().to_string();
        if uuid.is_empty() {
            return Err(CacheError::MissingIdentity {
                kind: T::KIND,
                name: record.name().to_string(),
            });
        }

        // A rename leaves a stale name entry behind unless it is dropped here.
        if let Some(previous) = self.source.get(&uuid) {
            if previous.name() != record.name() && self.system.get(previous.name()) == Some(&uuid) {
                self.system.remove(previous.name());
            }
        }
        if let Some(bound) = self.system.get(record.name()) {
            if bound != &uuid {
                warn!(
                    entity_type = T::KIND,
                    name = record.name(),
                    old = %bound,
                    new = %uuid,
                    "Name rebound"
                );
            }
        }

        self.system.insert(record.name().to_string(), uuid.clone());
        self.source.insert(uuid, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Cert {
        name: String,
        uuid: String,
    }

    impl CollectionEntity for Cert {
        const KIND: &'static str = "certificate";
        fn name(&self) -> &str {
            &self.name
        }
        fn source_uuid(&self) -> &str {
            &self.uuid
        }
    }

    fn cert(name: &str, uuid: &str) -> Cert {
        Cert {
            name: name.into(),
            uuid: uuid.into(),
        }
    }

    #[tokio::test]
    async fn test_both_indices_follow_upsert_and_remove() {
        let (actor, client) = CollectionActor::<Cert>::new(10);
        tokio::spawn(actor.run());

        client.upsert(cert("web", "c-1")).await.unwrap();
        assert_eq!(client.by_uuid("c-1").await.unwrap(), Some(cert("web", "c-1")));
        assert_eq!(client.by_name("web").await.unwrap(), Some(cert("web", "c-1")));

        let removed = client.remove("c-1").await.unwrap();
        assert_eq!(removed, Some(cert("web", "c-1")));
        assert!(client.by_uuid("c-1").await.unwrap().is_none());
        assert!(client.by_name("web").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_without_uuid_is_rejected() {
        let (actor, client) = CollectionActor::<Cert>::new(10);
        tokio::spawn(actor.run());

        let err = client.upsert(cert("pending", "")).await.unwrap_err();
        assert_eq!(
            err,
            CacheError::MissingIdentity {
                kind: "certificate",
                name: "pending".into()
            }
        );
        assert!(client.by_name("pending").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rename_drops_stale_name() {
        let (actor, client) = CollectionActor::<Cert>::new(10);
        tokio::spawn(actor.run());

        client.upsert(cert("old", "c-1")).await.unwrap();
        client.upsert(cert("new", "c-1")).await.unwrap();

        assert!(client.by_name("old").await.unwrap().is_none());
        assert_eq!(client.by_name("new").await.unwrap(), Some(cert("new", "c-1")));
        assert_eq!(client.snapshot().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_populate_replaces_collection() {
        let (actor, client) = CollectionActor::<Cert>::new(10);
        tokio::spawn(actor.run());

        client.upsert(cert("gone", "c-9")).await.unwrap();
        let size = client
            .populate(vec![cert("a", "c-1"), cert("b", "c-2"), cert("broken", "")])
            .await
            .unwrap();

        assert_eq!(size, 2);
        assert!(client.by_uuid("c-9").await.unwrap().is_none());
        assert!(client.by_name("b").await.unwrap().is_some());

        // Populating twice with the same data is idempotent.
        let again = client
            .populate(vec![cert("a", "c-1"), cert("b", "c-2")])
            .await
            .unwrap();
        assert_eq!(again, 2);
    }
}

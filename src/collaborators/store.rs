use crate::error::{LbError, Result};
use crate::model::VsStatus;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Durable last-write-wins storage for neutral records.
///
/// The status slot is independent of the payload so an in-flight mutation can be
/// polled without reading or rewriting the record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn put(&self, id: &str, record: Value) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<Value>>;

    /// Removes the record and its status.
    async fn delete(&self, id: &str) -> Result<()>;

    async fn set_status(&self, id: &str, status: VsStatus) -> Result<()>;

    async fn status(&self, id: &str) -> Result<Option<VsStatus>>;
}

/// Typed access on top of any [`RecordStore`].
#[async_trait]
pub trait StoreExt: RecordStore {
    async fn put_record<T: Serialize + Sync>(&self, id: &str, record: &T) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.put(id, value).await
    }

    async fn get_record<T: DeserializeOwned + Send>(&self, id: &str) -> Result<Option<T>> {
        match self.get(id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

impl<S: RecordStore + ?Sized> StoreExt for S {}

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, Value>>,
    statuses: RwLock<HashMap<String, VsStatus>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn put(&self, id: &str, record: Value) -> Result<()> {
        if id.is_empty() {
            return Err(LbError::Store("record id is empty".into()));
        }
        debug!(%id, "put");
        self.records.write().await.insert(id.to_string(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        debug!(%id, "delete");
        self.records.write().await.remove(id);
        self.statuses.write().await.remove(id);
        Ok(())
    }

    async fn set_status(&self, id: &str, status: VsStatus) -> Result<()> {
        if id.is_empty() {
            return Err(LbError::Store("record id is empty".into()));
        }
        debug!(%id, %status, "set_status");
        self.statuses.write().await.insert(id.to_string(), status);
        Ok(())
    }

    async fn status(&self, id: &str) -> Result<Option<VsStatus>> {
        Ok(self.statuses.read().await.get(id).copied())
    }
}

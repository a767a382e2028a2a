use crate::adapters::{Resource, VendorDriver};
use crate::error::{LbError, Result};
use crate::model::Vendor;
use collection_actor::CollectionClient;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Create/Fetch/FetchAll/FetchByName/Modify/Delete for one resource type on one
/// appliance, keeping that appliance's collection cache in step with every call.
///
/// Cloning is cheap: the driver is shared and the cache client is a channel sender.
pub struct ResourceAdapter<R: Resource> {
    driver: Arc<dyn VendorDriver<R>>,
    cache: CollectionClient<R>,
}

impl<R: Resource> Clone for ResourceAdapter<R> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<R: Resource> ResourceAdapter<R> {
    pub fn new(driver: Arc<dyn VendorDriver<R>>, cache: CollectionClient<R>) -> Self {
        Self { driver, cache }
    }

    pub fn vendor(&self) -> Vendor {
        self.driver.vendor()
    }

    /// Replaces the cache with a full fetch. Idempotent.
    #[instrument(skip(self), fields(entity_type = R::KIND, vendor = %self.vendor()))]
    pub async fn populate(&self) -> Result<usize> {
        let records = self.fetch_valid().await?;
        let size = self.cache.populate(records).await?;
        info!(size, "Cache populated");
        Ok(size)
    }

    /// Creates the record on the appliance and refreshes it from a post-create fetch.
    ///
    /// An "already exists" answer is recoverable: the existing object is looked up by
    /// name and brought to the requested state, unless the record is immutable, in which
    /// case it is reused as found.
    #[instrument(skip(self, record), fields(entity_type = R::KIND, name = record.name()))]
    pub async fn create(&self, record: &mut R) -> Result<()> {
        if !record.source_uuid().is_empty() {
            return Err(LbError::validation(format!(
                "{} '{}' already exists as {}",
                R::KIND,
                record.name(),
                record.source_uuid()
            )));
        }
        record.apply_defaults();
        record.validate()?;
        debug!(?record, "create called");

        let uuid = match self.driver.create(record).await {
            Ok(uuid) => {
                info!(%uuid, "Created");
                uuid
            }
            Err(e) if e.is_conflict() => {
                let Some(uuid) = self.driver.lookup(record.name()).await? else {
                    return Err(e);
                };
                if record.is_immutable() {
                    info!(%uuid, "Already exists, reusing as-is");
                } else {
                    self.driver.update(&uuid, record).await?;
                    info!(%uuid, "Already exists, reused and updated");
                }
                uuid
            }
            Err(e) => return Err(e),
        };

        let fresh = self.driver.fetch(&uuid).await?;
        self.cache.upsert(fresh.clone()).await?;
        *record = fresh;
        Ok(())
    }

    /// Re-reads one record from the appliance.
    #[instrument(skip(self), fields(entity_type = R::KIND))]
    pub async fn fetch(&self, uuid: &str) -> Result<R> {
        match self.driver.fetch(uuid).await {
            Ok(record) => {
                self.cache.upsert(record.clone()).await?;
                Ok(record)
            }
            Err(e) if e.is_not_found() => {
                self.cache.remove(uuid).await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Full re-read; the cache is replaced with the result.
    #[instrument(skip(self), fields(entity_type = R::KIND, vendor = %self.vendor()))]
    pub async fn fetch_all(&self) -> Result<Vec<R>> {
        let records = self.fetch_valid().await?;
        self.cache.populate(records.clone()).await?;
        Ok(records)
    }

    #[instrument(skip(self), fields(entity_type = R::KIND))]
    pub async fn fetch_by_name(&self, name: &str) -> Result<Option<R>> {
        match self.driver.lookup(name).await? {
            Some(uuid) => self.fetch(&uuid).await.map(Some),
            None => Ok(None),
        }
    }

    /// Pushes the requested state onto an existing object and returns the refreshed record.
    #[instrument(skip(self, record), fields(entity_type = R::KIND, name = record.name()))]
    pub async fn modify(&self, record: &R) -> Result<R> {
        let uuid = record.source_uuid().to_string();
        if uuid.is_empty() {
            return Err(LbError::validation(format!(
                "{} '{}' has not been created",
                R::KIND,
                record.name()
            )));
        }
        if record.is_immutable() {
            return Err(LbError::validation(format!(
                "{} '{}' cannot be modified",
                R::KIND,
                record.name()
            )));
        }
        let mut requested = record.clone();
        requested.apply_defaults();
        requested.validate()?;
        debug!(?requested, "modify called");

        self.driver.update(&uuid, &requested).await?;
        let fresh = self.driver.fetch(&uuid).await?;
        self.cache.upsert(fresh.clone()).await?;
        info!(%uuid, "Modified");
        Ok(fresh)
    }

    /// Deletes the object. One that is already gone counts as deleted.
    #[instrument(skip(self, record), fields(entity_type = R::KIND, name = record.name()))]
    pub async fn delete(&self, record: &R) -> Result<()> {
        let uuid = record.source_uuid();
        if uuid.is_empty() {
            return Err(LbError::validation(format!(
                "{} '{}' has not been created",
                R::KIND,
                record.name()
            )));
        }
        match self.driver.delete(uuid).await {
            Ok(()) => info!(%uuid, "Deleted"),
            Err(e) if e.is_not_found() => debug!(%uuid, "Already gone"),
            Err(e) => return Err(e),
        }
        self.cache.remove(uuid).await?;
        Ok(())
    }

    /// Cached record, fetched from the appliance on a miss.
    pub async fn resolve(&self, uuid: &str) -> Result<R> {
        if let Some(record) = self.cache.by_uuid(uuid).await? {
            return Ok(record);
        }
        self.fetch(uuid).await
    }

    pub async fn cached(&self, uuid: &str) -> Result<Option<R>> {
        Ok(self.cache.by_uuid(uuid).await?)
    }

    pub async fn cached_by_name(&self, name: &str) -> Result<Option<R>> {
        Ok(self.cache.by_name(name).await?)
    }

    /// Every cached record, for reference scans.
    pub async fn snapshot(&self) -> Result<Vec<R>> {
        Ok(self.cache.snapshot().await?)
    }

    async fn fetch_valid(&self) -> Result<Vec<R>> {
        let mut records = Vec::new();
        for result in self.driver.fetch_all().await? {
            match result {
                Ok(record) => records.push(record),
                Err(e) => warn!(entity_type = R::KIND, error = %e, "Skipping record"),
            }
        }
        Ok(records)
    }
}

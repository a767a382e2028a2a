use crate::adapters::Resource;
use crate::error::{LbError, Result};
use crate::model::Pool;
use collection_actor::CollectionEntity;
use serde::{Deserialize, Serialize};

/// Smallest membership a pool group may have on the appliance.
pub const MIN_POOL_GROUP_MEMBERS: usize = 2;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolGroup {
    pub name: String,
    pub source_uuid: String,
    pub pools: Vec<Pool>,
}

impl PoolGroup {
    pub fn new(name: impl Into<String>, pools: Vec<Pool>) -> Self {
        Self {
            name: name.into(),
            source_uuid: String::new(),
            pools,
        }
    }

    pub fn references(&self, pool_uuid: &str) -> bool {
        !pool_uuid.is_empty() && self.pools.iter().any(|p| p.source_uuid == pool_uuid)
    }
}

impl CollectionEntity for PoolGroup {
    const KIND: &'static str = "pool-group";

    fn name(&self) -> &str {
        &self.name
    }

    fn source_uuid(&self) -> &str {
        &self.source_uuid
    }
}

impl Resource for PoolGroup {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LbError::validation("pool group name is required"));
        }
        if self.pools.len() < MIN_POOL_GROUP_MEMBERS {
            return Err(LbError::validation(format!(
                "pool group '{}' needs at least {} members, got {}",
                self.name,
                MIN_POOL_GROUP_MEMBERS,
                self.pools.len()
            )));
        }
        if self.pools.iter().any(|p| p.source_uuid.is_empty()) {
            return Err(LbError::validation(format!(
                "pool group '{}' references a pool that was never created",
                self.name
            )));
        }
        Ok(())
    }
}

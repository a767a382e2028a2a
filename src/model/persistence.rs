use crate::adapters::Resource;
use crate::error::{LbError, Result};
use collection_actor::CollectionEntity;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minutes.
pub const DEFAULT_PERSISTENCE_TIMEOUT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PersistenceType {
    #[default]
    ClientIp,
    HttpCookie,
    CustomHttpHeader,
    AppCookie,
    Tls,
}

impl PersistenceType {
    pub fn as_str(self) -> &'static str {
        match self {
            PersistenceType::ClientIp => "client-ip",
            PersistenceType::HttpCookie => "http-cookie",
            PersistenceType::CustomHttpHeader => "custom-http-header",
            PersistenceType::AppCookie => "app-cookie",
            PersistenceType::Tls => "tls",
        }
    }
}

impl fmt::Display for PersistenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceProfile {
    pub name: String,
    pub source_uuid: String,
    pub persistence_type: PersistenceType,
    /// Minutes.
    pub timeout: u32,
    pub cookie_name: Option<String>,
    pub header_name: Option<String>,
}

impl PersistenceProfile {
    pub fn new(name: impl Into<String>, persistence_type: PersistenceType) -> Self {
        Self {
            name: name.into(),
            persistence_type,
            ..Default::default()
        }
    }
}

impl CollectionEntity for PersistenceProfile {
    const KIND: &'static str = "persistence-profile";

    fn name(&self) -> &str {
        &self.name
    }

    fn source_uuid(&self) -> &str {
        &self.source_uuid
    }
}

impl Resource for PersistenceProfile {
    fn apply_defaults(&mut self) {
        if self.timeout == 0 {
            self.timeout = DEFAULT_PERSISTENCE_TIMEOUT;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LbError::validation("persistence profile name is required"));
        }
        let needs_header = matches!(
            self.persistence_type,
            PersistenceType::CustomHttpHeader | PersistenceType::AppCookie
        );
        if needs_header && self.header_name.as_deref().unwrap_or_default().is_empty() {
            return Err(LbError::validation(format!(
                "persistence profile '{}' of type {} needs a header name",
                self.name, self.persistence_type
            )));
        }
        Ok(())
    }
}

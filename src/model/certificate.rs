use crate::adapters::Resource;
use crate::error::{LbError, Result};
use collection_actor::CollectionEntity;
use serde::{Deserialize, Serialize};

/// TLS material attached to a virtual server or a pool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Certificate {
    pub name: String,
    pub source_uuid: String,
    /// PEM encoded certificate chain.
    pub certificate: String,
    /// PEM encoded private key. Appliances never return it, so it is empty after a fetch.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub subject: String,
    pub issuer: String,
}

impl Certificate {
    pub fn new(
        name: impl Into<String>,
        certificate: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            certificate: certificate.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>, issuer: impl Into<String>) -> Self {
        self.subject = subject.into();
        self.issuer = issuer.into();
        self
    }

    pub fn self_signed(&self) -> bool {
        !self.subject.is_empty() && self.subject == self.issuer
    }
}

impl CollectionEntity for Certificate {
    const KIND: &'static str = "certificate";

    fn name(&self) -> &str {
        &self.name
    }

    fn source_uuid(&self) -> &str {
        &self.source_uuid
    }
}

impl Resource for Certificate {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LbError::validation("certificate name is required"));
        }
        if self.certificate.trim().is_empty() {
            return Err(LbError::validation(format!(
                "certificate '{}' has no certificate material",
                self.name
            )));
        }
        Ok(())
    }

    /// Self-signed certificates are reused as found and never rewritten.
    fn is_immutable(&self) -> bool {
        self.self_signed()
    }
}

use crate::adapters::Resource;
use crate::error::{LbError, Result};
use crate::model::{parse_ipv4, Certificate, Pool, PoolGroup, Vendor, VsStatus};
use collection_actor::CollectionEntity;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    #[default]
    Http,
    Https,
    Tcp,
    Udp,
    Ssl,
    SslBridge,
    Dns,
}

impl ServiceType {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::Http => "http",
            ServiceType::Https => "https",
            ServiceType::Tcp => "tcp",
            ServiceType::Udp => "udp",
            ServiceType::Ssl => "ssl",
            ServiceType::SslBridge => "ssl-bridge",
            ServiceType::Dns => "dns",
        }
    }

    /// Terminates TLS on the appliance, so a certificate is required.
    pub fn terminates_tls(self) -> bool {
        matches!(self, ServiceType::Https | ServiceType::Ssl)
    }

    /// Service types that only carry opaque TLS and cannot be migrated.
    pub fn is_ssl_only(self) -> bool {
        matches!(self, ServiceType::Ssl | ServiceType::SslBridge)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The top of the hierarchy.
///
/// `id`, `status`, `last_error` and `dns_names` belong to the control plane and never
/// come back from an appliance; everything else is refreshed on every fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualServer {
    pub id: String,
    pub name: String,
    pub source_uuid: String,
    pub vendor: Vendor,
    /// Management address of the appliance that owns this virtual server.
    pub address: String,
    pub ip: String,
    pub port: u16,
    pub service_type: ServiceType,
    pub enabled: bool,
    /// The effective pool list, whether or not a pool group fronts it.
    pub pools: Vec<Pool>,
    pub pool_group: Option<PoolGroup>,
    pub certificates: Vec<Certificate>,
    pub dns_names: Vec<String>,
    pub routing_context: Option<String>,
    pub status: VsStatus,
    pub last_error: Option<String>,
    /// Vendor identity of the VIP object (Avi vsvip uuid, Netscaler nsip address).
    pub source_vip_uuid: String,
}

impl Default for VirtualServer {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            source_uuid: String::new(),
            vendor: Vendor::default(),
            address: String::new(),
            ip: String::new(),
            port: 0,
            service_type: ServiceType::default(),
            enabled: true,
            pools: Vec::new(),
            pool_group: None,
            certificates: Vec::new(),
            dns_names: Vec::new(),
            routing_context: None,
            status: VsStatus::default(),
            last_error: None,
            source_vip_uuid: String::new(),
        }
    }
}

impl VirtualServer {
    pub fn new(name: impl Into<String>, port: u16, service_type: ServiceType) -> Self {
        Self {
            name: name.into(),
            port,
            service_type,
            ..Default::default()
        }
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = ip.into();
        self
    }

    pub fn with_pool(mut self, pool: Pool) -> Self {
        self.pools.push(pool);
        self
    }

    pub fn with_certificate(mut self, certificate: Certificate) -> Self {
        self.certificates.push(certificate);
        self
    }

    pub fn references_pool(&self, uuid: &str) -> bool {
        !uuid.is_empty() && self.pools.iter().any(|p| p.source_uuid == uuid)
    }

    pub fn references_pool_group(&self, uuid: &str) -> bool {
        !uuid.is_empty()
            && self
                .pool_group
                .as_ref()
                .is_some_and(|g| g.source_uuid == uuid)
    }

    pub fn references_certificate(&self, uuid: &str) -> bool {
        !uuid.is_empty() && self.certificates.iter().any(|c| c.source_uuid == uuid)
    }

    /// Copies the control-plane owned fields from the record the caller submitted onto a
    /// freshly fetched one.
    pub fn carry_local_fields(&mut self, requested: &VirtualServer) {
        self.id = requested.id.clone();
        self.dns_names = requested.dns_names.clone();
        self.status = requested.status;
        self.last_error = requested.last_error.clone();
        if self.routing_context.is_none() {
            self.routing_context = requested.routing_context.clone();
        }
    }
}

impl CollectionEntity for VirtualServer {
    const KIND: &'static str = "virtual-server";

    fn name(&self) -> &str {
        &self.name
    }

    fn source_uuid(&self) -> &str {
        &self.source_uuid
    }
}

impl Resource for VirtualServer {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LbError::validation("virtual server name is required"));
        }
        if self.port == 0 {
            return Err(LbError::validation(format!(
                "virtual server '{}' needs a port",
                self.name
            )));
        }
        if !self.ip.is_empty() {
            parse_ipv4(&self.ip)?;
        }
        if self.pools.is_empty() {
            return Err(LbError::validation(format!(
                "virtual server '{}' needs at least one pool",
                self.name
            )));
        }
        if self.service_type.terminates_tls() && self.certificates.is_empty() {
            return Err(LbError::validation(format!(
                "virtual server '{}' of type {} needs a certificate",
                self.name, self.service_type
            )));
        }
        if !self.vendor.supports_service(self.service_type) {
            return Err(LbError::validation(format!(
                "{} does not support service type {}",
                self.vendor, self.service_type
            )));
        }
        Ok(())
    }
}

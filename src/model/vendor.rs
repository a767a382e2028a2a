use crate::error::{LbError, Result};
use crate::model::{MonitorType, PersistenceType, ServiceType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two supported appliance families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[default]
    Avi,
    Netscaler,
}

/// Name prefixes that mark a record as belonging to a product.
const KNOWN_PREFIXES: &[&str] = &["avi-", "netscaler-", "ns-"];

const AVI_SERVICES: &[ServiceType] = &[
    ServiceType::Http,
    ServiceType::Https,
    ServiceType::Tcp,
    ServiceType::Udp,
    ServiceType::Ssl,
    ServiceType::Dns,
];

const NETSCALER_SERVICES: &[ServiceType] = &[
    ServiceType::Http,
    ServiceType::Https,
    ServiceType::Tcp,
    ServiceType::Udp,
    ServiceType::Ssl,
    ServiceType::SslBridge,
    ServiceType::Dns,
];

const AVI_PERSISTENCE: &[PersistenceType] = &[
    PersistenceType::ClientIp,
    PersistenceType::HttpCookie,
    PersistenceType::CustomHttpHeader,
    PersistenceType::AppCookie,
    PersistenceType::Tls,
];

const NETSCALER_PERSISTENCE: &[PersistenceType] = &[
    PersistenceType::ClientIp,
    PersistenceType::HttpCookie,
    PersistenceType::CustomHttpHeader,
    PersistenceType::Tls,
];

const ALL_MONITORS: &[MonitorType] = &[
    MonitorType::Http,
    MonitorType::Https,
    MonitorType::Tcp,
    MonitorType::Udp,
    MonitorType::Ping,
    MonitorType::External,
];

impl Vendor {
    pub fn product_code(self) -> &'static str {
        match self {
            Vendor::Avi => "avi",
            Vendor::Netscaler => "netscaler",
        }
    }

    /// Resolves a product code as used in record names and migration requests.
    pub fn from_product_code(code: &str) -> Result<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "avi" => Ok(Vendor::Avi),
            "netscaler" | "ns" => Ok(Vendor::Netscaler),
            other => Err(LbError::validation(format!("unknown product code '{other}'"))),
        }
    }

    /// Strips any known product prefix from a declared name.
    pub fn strip_product_prefix(name: &str) -> &str {
        KNOWN_PREFIXES
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix))
            .unwrap_or(name)
    }

    pub fn supported_services(self) -> &'static [ServiceType] {
        match self {
            Vendor::Avi => AVI_SERVICES,
            Vendor::Netscaler => NETSCALER_SERVICES,
        }
    }

    pub fn supported_persistence(self) -> &'static [PersistenceType] {
        match self {
            Vendor::Avi => AVI_PERSISTENCE,
            Vendor::Netscaler => NETSCALER_PERSISTENCE,
        }
    }

    pub fn supported_monitors(self) -> &'static [MonitorType] {
        ALL_MONITORS
    }

    pub fn supports_service(self, service: ServiceType) -> bool {
        self.supported_services().contains(&service)
    }

    pub fn supports_persistence(self, persistence: PersistenceType) -> bool {
        self.supported_persistence().contains(&persistence)
    }

    pub fn supports_monitor(self, monitor: MonitorType) -> bool {
        self.supported_monitors().contains(&monitor)
    }

    /// Avi expresses multi-pool virtual servers through a pool group object.
    /// Netscaler binds several service groups to the virtual server instead.
    pub fn has_pool_groups(self) -> bool {
        matches!(self, Vendor::Avi)
    }

    /// Netscaler keeps persistence settings inline on the virtual server.
    pub fn has_persistence_objects(self) -> bool {
        matches!(self, Vendor::Avi)
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.product_code())
    }
}

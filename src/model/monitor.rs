use crate::adapters::Resource;
use crate::error::{LbError, Result};
use collection_actor::CollectionEntity;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_MONITOR_INTERVAL: u32 = 30;
pub const DEFAULT_MONITOR_TIMEOUT: u32 = 15;
pub const DEFAULT_MONITOR_SUCCESS: u32 = 2;
pub const DEFAULT_MONITOR_FAILURE: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MonitorType {
    #[default]
    Http,
    Https,
    Tcp,
    Udp,
    Ping,
    External,
}

impl MonitorType {
    pub fn as_str(self) -> &'static str {
        match self {
            MonitorType::Http => "http",
            MonitorType::Https => "https",
            MonitorType::Tcp => "tcp",
            MonitorType::Udp => "udp",
            MonitorType::Ping => "ping",
            MonitorType::External => "external",
        }
    }
}

impl fmt::Display for MonitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when a send string is an HTTP request line (`GET /health HTTP/1.1`).
pub fn is_http_request(send: &str) -> bool {
    let method = send
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(method.as_str(), "GET" | "POST" | "PUT" | "HEAD")
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthMonitor {
    pub name: String,
    pub source_uuid: String,
    pub monitor_type: MonitorType,
    /// Seconds between checks.
    pub interval: u32,
    /// Seconds to wait for a response.
    pub timeout: u32,
    pub success_count: u32,
    pub failure_count: u32,
    /// Request line for http(s) monitors, payload for tcp/udp ones.
    pub send_string: Option<String>,
    /// Accepted status classes, e.g. `2xx`.
    pub expected_codes: Vec<String>,
}

impl HealthMonitor {
    pub fn new(name: impl Into<String>, monitor_type: MonitorType) -> Self {
        Self {
            name: name.into(),
            monitor_type,
            ..Default::default()
        }
    }

    /// The type a monitor really checks with: a tcp monitor sending an HTTP request is an
    /// http monitor.
    pub fn effective_type(&self) -> MonitorType {
        match (self.monitor_type, self.send_string.as_deref()) {
            (MonitorType::Tcp, Some(send)) if is_http_request(send) => MonitorType::Http,
            (other, _) => other,
        }
    }
}

impl CollectionEntity for HealthMonitor {
    const KIND: &'static str = "health-monitor";

    fn name(&self) -> &str {
        &self.name
    }

    fn source_uuid(&self) -> &str {
        &self.source_uuid
    }
}

impl Resource for HealthMonitor {
    fn apply_defaults(&mut self) {
        if self.interval == 0 {
            self.interval = DEFAULT_MONITOR_INTERVAL;
        }
        if self.timeout == 0 {
            self.timeout = DEFAULT_MONITOR_TIMEOUT;
        }
        if self.success_count == 0 {
            self.success_count = DEFAULT_MONITOR_SUCCESS;
        }
        if self.failure_count == 0 {
            self.failure_count = DEFAULT_MONITOR_FAILURE;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LbError::validation("health monitor name is required"));
        }
        if self.timeout > self.interval {
            return Err(LbError::validation(format!(
                "health monitor '{}': timeout {}s exceeds interval {}s",
                self.name, self.timeout, self.interval
            )));
        }
        Ok(())
    }
}

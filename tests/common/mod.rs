#![allow(dead_code)]

use lb_control_plane::collaborators::InMemoryStore;
use lb_control_plane::config::{ControlPlaneConfig, RetrySettings, TargetConfig};
use lb_control_plane::lifecycle::ControlPlane;
use lb_control_plane::mock::{MockAppliance, MockFabric, StaticIpam};
use lb_control_plane::model::{Pool, ServiceType, Vendor, VirtualServer};
use std::sync::Arc;

pub const AVI: &str = "10.10.0.1";
pub const NETSCALER: &str = "10.20.0.1";

pub struct Harness {
    pub plane: ControlPlane,
    pub avi: Arc<MockAppliance>,
    pub netscaler: Arc<MockAppliance>,
    pub fabric: Arc<MockFabric>,
    pub ipam: Arc<StaticIpam>,
    pub store: Arc<InMemoryStore>,
}

/// Both appliances route 10.0.0.0/16, so VIPs and backends in it pass every routing check.
pub fn appliances() -> (Arc<MockAppliance>, Arc<MockAppliance>) {
    let avi = MockAppliance::avi(AVI);
    avi.add_network("vip-net", "10.0.0.0/16".parse().unwrap());
    let netscaler = MockAppliance::netscaler(NETSCALER);
    netscaler.add_network("vip-net", "10.0.0.0/16".parse().unwrap());
    (avi, netscaler)
}

pub fn config() -> ControlPlaneConfig {
    let mut config = ControlPlaneConfig::default()
        .with_target(
            TargetConfig::new(AVI, Vendor::Avi)
                .with_ipam_network("10.0.200.0/24".parse().unwrap()),
        )
        .with_target(TargetConfig::new(NETSCALER, Vendor::Netscaler));
    config.retry = RetrySettings {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 5,
    };
    config
}

pub async fn start_with(
    avi: Arc<MockAppliance>,
    netscaler: Arc<MockAppliance>,
    config: ControlPlaneConfig,
) -> Harness {
    let fabric = MockFabric::new();
    fabric.add(avi.clone());
    fabric.add(netscaler.clone());
    let ipam = Arc::new(StaticIpam::new());
    let store = Arc::new(InMemoryStore::new());
    let plane = ControlPlane::start(config, fabric.clone(), ipam.clone(), store.clone())
        .await
        .expect("control plane starts");
    Harness {
        plane,
        avi,
        netscaler,
        fabric,
        ipam,
        store,
    }
}

pub async fn start() -> Harness {
    let (avi, netscaler) = appliances();
    start_with(avi, netscaler, config()).await
}

/// An http virtual server on `address` with one pool and one backend.
pub fn web_server(name: &str, address: &str, ip: &str) -> VirtualServer {
    let mut vs = VirtualServer::new(name, 80, ServiceType::Http)
        .with_ip(ip)
        .with_pool(Pool::new(format!("{name}-web")).with_binding("10.0.0.5", 80));
    vs.address = address.to_string();
    vs
}

//! Walks one virtual server through its whole life against in-memory Avi and Netscaler
//! appliances: create, modify, list across targets, then migrate to the other vendor.
//!
//! Targets come from `lb-control-plane.toml` when it exists; without it the two
//! simulated appliances below are used.

use lb_control_plane::collaborators::InMemoryStore;
use lb_control_plane::config::{ControlPlaneConfig, TargetConfig};
use lb_control_plane::lifecycle::tracing::setup_tracing;
use lb_control_plane::lifecycle::ControlPlane;
use lb_control_plane::mock::{MockAppliance, MockFabric, StaticIpam};
use lb_control_plane::model::{HealthMonitor, MonitorType, Pool, ServiceType, Vendor, VirtualServer};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

const AVI: &str = "10.10.0.1";
const NETSCALER: &str = "10.20.0.1";

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let mut config =
        ControlPlaneConfig::load(Path::new("lb-control-plane.toml")).map_err(|e| e.to_string())?;
    if config.targets.is_empty() {
        let ipam_network = "10.0.200.0/24"
            .parse()
            .map_err(|e: lb_control_plane::LbError| e.to_string())?;
        config = config
            .with_target(TargetConfig::new(AVI, Vendor::Avi).with_ipam_network(ipam_network))
            .with_target(TargetConfig::new(NETSCALER, Vendor::Netscaler));
    }

    let source = config
        .targets
        .iter()
        .find(|t| t.vendor == Vendor::Avi)
        .map(|t| t.address.clone())
        .ok_or("no Avi target configured")?;

    let fabric = MockFabric::new();
    for target in &config.targets {
        let appliance = MockAppliance::new(target.vendor, target.address.clone());
        let vip_net = "10.0.0.0/16".parse().map_err(|e: lb_control_plane::LbError| e.to_string())?;
        appliance.add_network("vip-net", vip_net);
        fabric.add(appliance);
    }

    info!(targets = config.targets.len(), "Starting control plane");
    let plane = ControlPlane::start(
        config,
        fabric,
        Arc::new(StaticIpam::new()),
        Arc::new(InMemoryStore::new()),
    )
    .await
    .map_err(|e| e.to_string())?;

    let mut requested = VirtualServer::new("shop", 80, ServiceType::Http)
        .with_pool(
            Pool::new("shop-web")
                .with_binding("10.0.1.5", 80)
                .with_binding("10.0.1.6", 80)
                .with_monitor(HealthMonitor::new("shop-check", MonitorType::Http)),
        )
        .with_pool(Pool::new("shop-canary").with_binding("10.0.1.9", 80));
    requested.address = source;

    let span = tracing::info_span!("create");
    let created = async { plane.create(requested).await.map_err(|e| e.to_string()) }
        .instrument(span)
        .await?;
    info!(
        id = %created.record.id,
        ip = %created.record.ip,
        status = %created.record.status,
        group = ?created.record.pool_group.as_ref().map(|g| g.name.as_str()),
        "Virtual server created"
    );

    // Retire the canary pool and one backend
    let mut smaller = created.record.clone();
    smaller.pools.retain(|p| p.name == "shop-web");
    smaller.pools[0].bindings.retain(|b| b.server.ip != "10.0.1.6");
    smaller.pool_group = None;
    let span = tracing::info_span!("modify");
    let modified = async { plane.modify(&smaller).await.map_err(|e| e.to_string()) }
        .instrument(span)
        .await?;
    info!(
        status = %modified.record.status,
        removed_pools = modified.removed.pools.len(),
        removed_servers = modified.removed.servers.len(),
        "Virtual server modified"
    );
    for warning in &modified.warnings {
        warn!("{warning}");
    }

    let report = plane.fetch_all_targets().await;
    info!(
        completed = report.completed().len(),
        virtual_servers = report.records().count(),
        "Fetched every target"
    );

    let id = modified.record.id.clone();
    let span = tracing::info_span!("migration", %id);
    let migration = async {
        let staged = plane.stage(&id, "netscaler").await.map_err(|e| e.to_string())?;
        info!(status = %staged.status, target = %staged.target.name, "Migration staged");
        plane.migrate(&id).await.map_err(|e| e.to_string())
    }
    .instrument(span)
    .await;

    match migration {
        Ok(done) => info!(target_id = ?done.target_id, status = %done.status, "Migration complete"),
        Err(e) => error!(error = %e, "Migration failed"),
    }

    plane.shutdown().await.map_err(|e| e.to_string())?;

    info!("Demo completed successfully");
    Ok(())
}

mod common;

use common::{appliances, config, start, start_with, web_server, AVI, NETSCALER};
use lb_control_plane::migration::MigrationStatus;
use lb_control_plane::model::{VirtualServer, VsStatus};
use lb_control_plane::vendor::{avi, netscaler};
use lb_control_plane::LbError;
use serde_json::Value;

async fn create_on_avi(h: &common::Harness, name: &str, ip: &str, port: u16) -> VirtualServer {
    let mut vs = web_server(name, AVI, ip);
    vs.port = port;
    let vs = h.plane.create(vs).await.expect("Failed to create source").record;
    assert_eq!(vs.status, VsStatus::Ready, "last error: {:?}", vs.last_error);
    vs
}

#[tokio::test]
async fn test_migrate_avi_to_netscaler() {
    let h = start().await;
    let source = create_on_avi(&h, "shop", "10.0.0.10", 80).await;

    let staged = h.plane.stage(&source.id, "netscaler").await.expect("Failed to stage");
    assert_eq!(staged.status, MigrationStatus::Ready, "failures: {:?}", staged.checks.failures());
    assert_eq!(staged.target.name, "netscaler-shop");
    assert_eq!(staged.target_address, NETSCALER);
    assert!(staged.target.source_uuid.is_empty());

    let migrated = h.plane.migrate(&source.id).await.expect("Failed to migrate");

    assert_eq!(migrated.status, MigrationStatus::Migrated);
    let target_id = migrated.target_id.clone().expect("target record id");
    assert_eq!(h.plane.status(&target_id).await.unwrap(), Some(VsStatus::Ready));
    assert_eq!(migrated.target.ip, "10.0.0.10");
    assert!(h.netscaler.object(netscaler::LB_VSERVER, "netscaler-shop").is_some());
    assert!(h.netscaler.object_named(netscaler::SERVICE_GROUP, "netscaler-shop-web").is_some());

    // The source stays on Avi, disabled and marked migrated
    assert_eq!(h.plane.status(&source.id).await.unwrap(), Some(VsStatus::Migrated));
    let on_avi = h
        .avi
        .object(avi::VIRTUAL_SERVICE, &source.source_uuid)
        .expect("source kept");
    assert_eq!(on_avi["enabled"], Value::Bool(false));

    let persisted = h.plane.migration(&source.id).await.unwrap().expect("artifact saved");
    assert_eq!(persisted.status, MigrationStatus::Migrated);
}

/// Two virtual servers behind one VIP must move together; the cutover is refused and
/// neither appliance changes.
#[tokio::test]
async fn test_shared_ip_blocks_migration() {
    let h = start().await;
    let source = create_on_avi(&h, "shop", "10.0.0.10", 80).await;
    let peer = create_on_avi(&h, "shop-admin", "10.0.0.10", 8080).await;

    let staged = h.plane.stage(&source.id, "netscaler").await.unwrap();
    assert_eq!(staged.status, MigrationStatus::NotReady);
    assert!(!staged.checks.dependency.ready);
    assert_eq!(staged.checks.dependency.peers.len(), 1);
    assert_eq!(staged.checks.dependency.peers[0].source_uuid, peer.source_uuid);
    assert_eq!(staged.checks.dependency.peers[0].port, 8080);

    let avi_writes = h.avi.mutation_count();
    let ns_writes = h.netscaler.mutation_count();
    let result = h.plane.migrate(&source.id).await;

    assert!(matches!(result, Err(LbError::MigrationBlocked(_))));
    assert_eq!(h.avi.mutation_count(), avi_writes);
    assert_eq!(h.netscaler.mutation_count(), ns_writes);
    assert_eq!(h.plane.status(&source.id).await.unwrap(), Some(VsStatus::Ready));
}

#[tokio::test]
async fn test_second_migrate_is_refused() {
    let h = start().await;
    let source = create_on_avi(&h, "shop", "10.0.0.10", 80).await;
    h.plane.stage(&source.id, "netscaler").await.unwrap();
    h.plane.migrate(&source.id).await.expect("first cutover");

    let ns_writes = h.netscaler.mutation_count();
    let again = h.plane.migrate(&source.id).await;

    assert!(matches!(again, Err(LbError::MigrationBlocked(_))));
    assert_eq!(h.netscaler.mutation_count(), ns_writes);
    assert_eq!(h.netscaler.count(netscaler::LB_VSERVER), 1);
}

#[tokio::test]
async fn test_migrate_without_stage_is_refused() {
    let h = start().await;
    let source = create_on_avi(&h, "shop", "10.0.0.10", 80).await;

    let result = h.plane.migrate(&source.id).await;
    assert!(matches!(result, Err(LbError::MigrationBlocked(_))));
}

#[tokio::test]
async fn test_stage_to_same_vendor_is_invalid() {
    let h = start().await;
    let source = create_on_avi(&h, "shop", "10.0.0.10", 80).await;

    let result = h.plane.stage(&source.id, "avi").await;
    assert!(matches!(result, Err(LbError::Validation(_))));
}

/// A target that cannot route the VIP or the backends reports every reason.
#[tokio::test]
async fn test_unroutable_target_is_not_ready() {
    let (avi, _) = appliances();
    let isolated = lb_control_plane::mock::MockAppliance::netscaler(NETSCALER);
    isolated.add_network("elsewhere", "192.168.0.0/24".parse().unwrap());
    let h = start_with(avi, isolated, config()).await;
    let source = create_on_avi(&h, "shop", "10.0.0.10", 80).await;

    let staged = h.plane.stage(&source.id, "ns").await.unwrap();

    assert_eq!(staged.status, MigrationStatus::NotReady);
    assert!(!staged.checks.ip_routing.passed);
    assert!(staged.checks.dependency.ready);
    let failures = staged.checks.failures();
    assert!(failures.iter().any(|f| f.starts_with("ip-routing")), "failures: {failures:?}");
    assert!(failures.iter().any(|f| f.contains("servers")), "failures: {failures:?}");
    assert!(matches!(
        h.plane.migrate(&source.id).await,
        Err(LbError::MigrationBlocked(_))
    ));
}

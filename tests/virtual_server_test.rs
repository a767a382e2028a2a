mod common;

use common::{appliances, config, start, start_with, web_server, AVI, NETSCALER};
use lb_control_plane::mock::Method;
use lb_control_plane::model::{
    Binding, Certificate, HealthMonitor, MonitorType, PersistenceProfile, PersistenceType, Pool,
    PoolGroup, ServiceType, VirtualServer, VsStatus,
};
use lb_control_plane::vendor::rpc::{RpcError, VendorSession};
use lb_control_plane::vendor::{avi, netscaler};
use lb_control_plane::LbError;

/// An http virtual server with one pool and one backend lands on the appliance and comes
/// back with its appliance identity.
#[tokio::test]
async fn test_create_http_virtual_server() {
    let h = start().await;

    let outcome = h
        .plane
        .create(web_server("avi-shop", AVI, "10.0.0.10"))
        .await
        .expect("Failed to create virtual server");
    let vs = outcome.record;

    assert_eq!(vs.status, VsStatus::Ready, "last error: {:?}", vs.last_error);
    assert!(!vs.source_uuid.is_empty());
    assert!(!vs.id.is_empty());
    assert_eq!(vs.service_type, ServiceType::Http);
    assert_eq!(vs.pools.len(), 1);
    assert_eq!(vs.pools[0].bindings[0].server.ip, "10.0.0.5");
    assert_eq!(vs.routing_context.as_deref(), Some("vip-net"));
    assert_eq!(vs.dns_names, vec!["avi-10-0-0-10.lb.internal".to_string()]);

    // One virtual service, its vsvip and its pool
    assert_eq!(h.avi.count(avi::VIRTUAL_SERVICE), 1);
    assert_eq!(h.avi.count(avi::VSVIP), 1);
    assert_eq!(h.avi.count(avi::POOL), 1);

    // The record and its status are persisted
    let stored = h.plane.record(&vs.id).await.unwrap().expect("record stored");
    assert_eq!(stored.source_uuid, vs.source_uuid);
    assert_eq!(h.plane.status(&vs.id).await.unwrap(), Some(VsStatus::Ready));
}

#[tokio::test]
async fn test_refetch_is_idempotent() {
    let h = start().await;
    let vs = h
        .plane
        .create(web_server("avi-shop", AVI, "10.0.0.10"))
        .await
        .unwrap()
        .record;

    let writes = h.avi.mutation_count();
    let first = h.plane.fetch(AVI, &vs.source_uuid).await.unwrap();
    let second = h.plane.fetch(AVI, &vs.source_uuid).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.avi.mutation_count(), writes, "reads must not write");
}

/// Dropping a backend reports exactly that binding; repeating the same request drops
/// nothing and deletes nothing.
#[tokio::test]
async fn test_modify_removes_binding_once() {
    let h = start().await;
    let requested = web_server("avi-shop", AVI, "10.0.0.10");
    let mut requested = requested;
    requested.pools[0] = requested.pools[0].clone().with_binding("10.0.0.6", 80);
    let vs = h.plane.create(requested).await.unwrap().record;
    assert_eq!(vs.pools[0].bindings.len(), 2);

    let mut smaller = vs.clone();
    smaller.pools[0].bindings.retain(|b| b.server.ip != "10.0.0.6");
    let outcome = h.plane.modify(&smaller).await.expect("Failed to modify");

    assert_eq!(outcome.record.status, VsStatus::Ready);
    assert_eq!(outcome.removed.servers, vec![Binding::new("10.0.0.6", 80)]);
    assert_eq!(outcome.record.pools[0].bindings.len(), 1);

    let calls_before = h.avi.calls().len();
    let again = h.plane.modify(&smaller).await.expect("Failed to modify again");
    assert!(again.removed.servers.is_empty());
    assert!(again.removed.is_empty());
    let deletes = h.avi.calls()[calls_before..]
        .iter()
        .filter(|call| call.starts_with("DELETE"))
        .count();
    assert_eq!(deletes, 0, "a repeated modify must not delete anything");
}

#[tokio::test]
async fn test_replaced_pool_is_reclaimed() {
    let h = start().await;
    let vs = h
        .plane
        .create(web_server("avi-shop", AVI, "10.0.0.10"))
        .await
        .unwrap()
        .record;
    let old_pool = vs.pools[0].source_uuid.clone();

    let mut requested = vs.clone();
    requested.pools = vec![Pool::new("avi-shop-api").with_binding("10.0.0.7", 8080)];
    let outcome = h.plane.modify(&requested).await.unwrap();

    assert_eq!(outcome.record.status, VsStatus::Ready);
    assert_eq!(outcome.record.pools[0].name, "avi-shop-api");
    assert_eq!(outcome.removed.pools.len(), 1);
    assert_eq!(outcome.removed.pools[0].source_uuid, old_pool);
    assert!(h.avi.object(avi::POOL, &old_pool).is_none(), "orphaned pool deleted");
    assert!(h.avi.object_named(avi::POOL, "avi-shop-api").is_some());
}

/// A pool another virtual server still uses survives the cleanup with a warning.
#[tokio::test]
async fn test_shared_pool_is_never_deleted() {
    let h = start().await;
    let shared = Pool::new("avi-shared").with_binding("10.0.0.5", 80);

    let mut first = web_server("avi-one", AVI, "10.0.0.10");
    first.pools = vec![shared.clone()];
    let first = h.plane.create(first).await.unwrap().record;

    let mut second = web_server("avi-two", AVI, "10.0.0.11");
    second.pools = vec![shared];
    let second = h.plane.create(second).await.unwrap().record;
    assert_eq!(
        first.pools[0].source_uuid, second.pools[0].source_uuid,
        "same-named pool is adopted"
    );

    let mut moved = first.clone();
    moved.pools = vec![Pool::new("avi-one-own").with_binding("10.0.0.8", 80)];
    let outcome = h.plane.modify(&moved).await.unwrap();

    assert_eq!(outcome.record.status, VsStatus::Ready);
    assert!(
        outcome.warnings.iter().any(|w| w.contains("still referenced")),
        "warnings: {:?}",
        outcome.warnings
    );
    assert!(h.avi.object(avi::POOL, &second.pools[0].source_uuid).is_some());
}

#[tokio::test]
async fn test_pool_group_follows_pool_count() {
    let h = start().await;
    let mut requested = web_server("avi-shop", AVI, "10.0.0.10");
    requested.pools.push(Pool::new("avi-shop-canary").with_binding("10.0.0.9", 80));

    let vs = h.plane.create(requested).await.unwrap().record;
    assert_eq!(vs.status, VsStatus::Ready, "last error: {:?}", vs.last_error);
    let group = vs.pool_group.clone().expect("two pools are fronted by a group");
    assert_eq!(group.pools.len(), 2);
    assert_eq!(h.avi.count(avi::POOL_GROUP), 1);

    // Back to one pool: the group is retired and the dropped pool reclaimed
    let mut single = vs.clone();
    single.pools.retain(|p| p.name == "avi-shop-web");
    single.pool_group = None;
    let outcome = h.plane.modify(&single).await.unwrap();

    assert_eq!(outcome.record.status, VsStatus::Ready);
    assert!(outcome.record.pool_group.is_none());
    assert_eq!(h.avi.count(avi::POOL_GROUP), 0);
    assert!(h.avi.object_named(avi::POOL, "avi-shop-canary").is_none());
    assert!(h.avi.object_named(avi::POOL, "avi-shop-web").is_some());
}

#[tokio::test]
async fn test_pool_group_below_minimum_is_rejected() {
    let h = start().await;
    let balancer = h.plane.balancer(AVI).unwrap();
    let groups = balancer.pool_groups().expect("avi has pool groups");

    let writes = h.avi.mutation_count();
    let result = groups
        .create(PoolGroup::new("lonely", vec![Pool::new("solo").with_binding("10.0.0.5", 80)]))
        .await;

    assert!(matches!(result, Err(LbError::Validation(_))));
    assert_eq!(h.avi.mutation_count(), writes);
}

/// Dropping a group to a single member dissolves it and reclaims every member nothing
/// else uses.
#[tokio::test]
async fn test_pool_group_modified_below_minimum_is_dissolved() {
    let h = start().await;
    let balancer = h.plane.balancer(AVI).unwrap();
    let groups = balancer.pool_groups().expect("avi has pool groups");

    let created = groups
        .create(PoolGroup::new(
            "avi-pair",
            vec![
                Pool::new("avi-pair-a").with_binding("10.0.0.5", 80),
                Pool::new("avi-pair-b").with_binding("10.0.0.6", 80),
            ],
        ))
        .await
        .expect("Failed to create pool group")
        .record;
    assert_eq!(h.avi.count(avi::POOL_GROUP), 1);
    assert_eq!(h.avi.count(avi::POOL), 2);

    let mut requested = created.clone();
    requested.pools.truncate(1);
    let outcome = groups.modify(&requested).await.expect("Failed to modify pool group");

    assert!(outcome.record.is_none());
    assert_eq!(outcome.removed.pool_groups.len(), 1);
    assert_eq!(outcome.removed.pool_groups[0].source_uuid, created.source_uuid);
    assert!(outcome.warnings.is_empty(), "warnings: {:?}", outcome.warnings);
    assert_eq!(h.avi.count(avi::POOL_GROUP), 0);
    assert_eq!(h.avi.count(avi::POOL), 0);
}

/// Vendor defaults are attached by name and stay on the appliance after removal.
#[tokio::test]
async fn test_default_children_survive_removal() {
    let (avi_appliance, netscaler_appliance) = appliances();
    let system_monitor = avi_appliance.seed(
        avi::HEALTH_MONITOR,
        serde_json::json!({ "name": "System-HTTP", "type": "HEALTH_MONITOR_HTTP" }),
    );
    let system_persistence = avi_appliance.seed(
        avi::PERSISTENCE_PROFILE,
        serde_json::json!({
            "name": "System-Persistence-Client-IP",
            "persistence_type": "PERSISTENCE_TYPE_CLIENT_IP_ADDRESS"
        }),
    );
    let h = start_with(avi_appliance, netscaler_appliance, config()).await;

    let mut requested = web_server("avi-shop", AVI, "10.0.0.10");
    requested.pools[0] = requested.pools[0]
        .clone()
        .with_monitor(HealthMonitor::new("System-HTTP", MonitorType::Http))
        .with_monitor(HealthMonitor::new("avi-shop-check", MonitorType::Tcp))
        .with_persistence(PersistenceProfile::new(
            "System-Persistence-Client-IP",
            PersistenceType::ClientIp,
        ));
    let vs = h.plane.create(requested).await.unwrap().record;
    assert_eq!(vs.status, VsStatus::Ready, "last error: {:?}", vs.last_error);
    let pool = &vs.pools[0];
    assert!(pool.health_monitors.iter().any(|m| m.source_uuid == system_monitor));
    assert_eq!(
        pool.persistence.as_ref().map(|p| p.source_uuid.as_str()),
        Some(system_persistence.as_str())
    );
    assert_eq!(h.avi.count(avi::HEALTH_MONITOR), 2, "the default is reused, not copied");

    let mut stripped = vs.clone();
    stripped.pools[0].health_monitors.clear();
    stripped.pools[0].persistence = None;
    let outcome = h.plane.modify(&stripped).await.unwrap();

    assert_eq!(outcome.record.status, VsStatus::Ready);
    assert_eq!(outcome.removed.health_monitors.len(), 2);
    assert!(h.avi.object(avi::HEALTH_MONITOR, &system_monitor).is_some());
    assert!(h.avi.object(avi::PERSISTENCE_PROFILE, &system_persistence).is_some());
    assert!(h.avi.object_named(avi::HEALTH_MONITOR, "avi-shop-check").is_none());
}

#[tokio::test]
async fn test_invalid_request_never_reaches_appliance() {
    let h = start().await;
    let writes = h.avi.mutation_count();

    let mut tls = web_server("avi-secure", AVI, "10.0.0.12");
    tls.service_type = ServiceType::Https;
    tls.port = 443;
    let result = h.plane.create(tls).await;

    assert!(matches!(result, Err(LbError::Validation(_))));
    assert_eq!(h.avi.mutation_count(), writes);
}

/// Appliance failures come back as a failed record, not as an error.
#[tokio::test]
async fn test_appliance_failure_is_recorded() {
    let h = start().await;
    h.avi.fail_always(
        Method::Post,
        "/api/virtualservice",
        RpcError::Rejected {
            status: 500,
            message: "controller busy".into(),
        },
    );

    let outcome = h
        .plane
        .create(web_server("avi-shop", AVI, "10.0.0.10"))
        .await
        .expect("failure is data");

    assert_eq!(outcome.record.status, VsStatus::Fail);
    assert!(outcome.record.last_error.as_deref().unwrap_or_default().contains("controller busy"));
    assert_eq!(h.plane.status(&outcome.record.id).await.unwrap(), Some(VsStatus::Fail));
    assert_eq!(h.avi.count(avi::VSVIP), 0, "half-created vsvip removed");
}

#[tokio::test]
async fn test_missing_ip_is_allocated() {
    let h = start().await;
    let mut requested = web_server("avi-shop", AVI, "");
    requested.ip.clear();

    let vs = h.plane.create(requested).await.unwrap().record;

    assert_eq!(vs.status, VsStatus::Ready, "last error: {:?}", vs.last_error);
    assert_eq!(vs.ip, "10.0.200.1");
    assert_eq!(h.ipam.names_for("10.0.200.1").await, vs.dns_names);
}

#[tokio::test]
async fn test_delete_reclaims_hierarchy() {
    let h = start().await;
    let mut requested = web_server("avi-shop", AVI, "10.0.0.10");
    requested.pools[0] = requested.pools[0]
        .clone()
        .with_monitor(HealthMonitor::new("avi-shop-check", MonitorType::Http));
    let vs = h.plane.create(requested).await.unwrap().record;
    assert_eq!(h.avi.count(avi::HEALTH_MONITOR), 1);

    let outcome = h.plane.delete(&vs.id).await.expect("Failed to delete");

    assert_eq!(outcome.record.status, VsStatus::Ready, "warnings: {:?}", outcome.warnings);
    assert_eq!(h.avi.count(avi::VIRTUAL_SERVICE), 0);
    assert_eq!(h.avi.count(avi::VSVIP), 0);
    assert_eq!(h.avi.count(avi::POOL), 0);
    assert_eq!(h.avi.count(avi::HEALTH_MONITOR), 0);
    assert!(h.plane.record(&vs.id).await.unwrap().is_none());
    assert!(h.plane.status(&vs.id).await.unwrap().is_none());
    assert!(h.ipam.names_for("10.0.0.10").await.is_empty());
}

#[tokio::test]
async fn test_delete_of_vanished_server_warns() {
    let h = start().await;
    let vs = h
        .plane
        .create(web_server("avi-shop", AVI, "10.0.0.10"))
        .await
        .unwrap()
        .record;

    // Someone removed it behind our back
    h.avi
        .session()
        .delete(&avi::obj_ref(avi::VIRTUAL_SERVICE, &vs.source_uuid))
        .await
        .unwrap();

    let outcome = h.plane.delete(&vs.id).await.unwrap();
    assert!(outcome.warnings.iter().any(|w| w.contains("already gone")));
    assert!(h.plane.record(&vs.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_netscaler_lifecycle() {
    let h = start().await;
    let mut requested = web_server("netscaler-shop", NETSCALER, "10.0.0.20");
    requested.pools[0] = requested.pools[0]
        .clone()
        .with_monitor(HealthMonitor::new("netscaler-check", MonitorType::Http));

    let vs = h.plane.create(requested).await.unwrap().record;
    assert_eq!(vs.status, VsStatus::Ready, "last error: {:?}", vs.last_error);
    assert_eq!(vs.source_uuid, "netscaler-shop");
    assert!(vs.pool_group.is_none());
    assert_eq!(vs.pools[0].health_monitors.len(), 1);
    assert_eq!(h.netscaler.count(netscaler::LB_VSERVER), 1);
    assert_eq!(h.netscaler.count(netscaler::SG_MONITOR_BINDING), 1);
    assert!(h.netscaler.object(netscaler::NS_IP, "10.0.0.20").is_some());

    // Dropping the monitor unbinds and then deletes it
    let mut requested = vs.clone();
    requested.pools[0].health_monitors.clear();
    let outcome = h.plane.modify(&requested).await.unwrap();
    assert_eq!(outcome.record.status, VsStatus::Ready, "warnings: {:?}", outcome.warnings);
    assert_eq!(outcome.removed.health_monitors.len(), 1);
    assert_eq!(h.netscaler.count(netscaler::LB_MONITOR), 0);

    // Several pools bind directly, never through a group
    let mut requested = outcome.record.clone();
    requested.pools.push(Pool::new("netscaler-shop-canary").with_binding("10.0.0.9", 80));
    let outcome = h.plane.modify(&requested).await.unwrap();
    assert!(outcome.record.pool_group.is_none());
    assert_eq!(h.netscaler.count(netscaler::VSERVER_SG_BINDING), 2);

    let deleted = h.plane.delete(&vs.id).await.unwrap();
    assert_eq!(deleted.record.status, VsStatus::Ready, "warnings: {:?}", deleted.warnings);
    assert_eq!(h.netscaler.count(netscaler::LB_VSERVER), 0);
    assert_eq!(h.netscaler.count(netscaler::SERVICE_GROUP), 0);
}

#[tokio::test]
async fn test_group_request_on_netscaler_is_rejected() {
    let h = start().await;
    let mut requested = web_server("netscaler-shop", NETSCALER, "10.0.0.20");
    requested.pool_group = Some(PoolGroup::new("g", requested.pools.clone()));

    let result = h.plane.create(requested).await;
    assert!(matches!(result, Err(LbError::Validation(_))));
}

#[tokio::test]
async fn test_self_signed_certificate_is_reused() {
    let h = start().await;
    let certificate =
        Certificate::new("avi-shop-cert", "PEM", "KEY").with_subject("CN=shop", "CN=shop");
    let mut first: VirtualServer =
        web_server("avi-shop", AVI, "10.0.0.10").with_certificate(certificate.clone());
    first.service_type = ServiceType::Https;
    first.port = 443;
    let first = h.plane.create(first).await.unwrap().record;
    assert_eq!(first.status, VsStatus::Ready, "last error: {:?}", first.last_error);

    let mut second = web_server("avi-shop-b", AVI, "10.0.0.11").with_certificate(certificate);
    second.service_type = ServiceType::Https;
    second.port = 443;
    let second = h.plane.create(second).await.unwrap().record;

    assert_eq!(second.status, VsStatus::Ready, "last error: {:?}", second.last_error);
    assert_eq!(first.certificates[0].source_uuid, second.certificates[0].source_uuid);
    assert_eq!(h.avi.count(avi::CERTIFICATE), 1);
}

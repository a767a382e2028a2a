mod common;

use common::{appliances, config, start, start_with, web_server, AVI, NETSCALER};
use lb_control_plane::collaborators::{InMemoryStore, RecordStore};
use lb_control_plane::config::RetrySettings;
use lb_control_plane::coordinator::TargetOutcome;
use lb_control_plane::lifecycle::ControlPlane;
use lb_control_plane::mock::{Method, MockFabric, StaticIpam};
use lb_control_plane::model::{VirtualServer, VsStatus};
use lb_control_plane::vendor::avi;
use lb_control_plane::vendor::rpc::RpcError;
use std::sync::Arc;
use std::time::Duration;

async fn wait_for_status(
    h: &common::Harness,
    id: &str,
    wanted: Option<VsStatus>,
) -> Option<VsStatus> {
    let mut status = None;
    for _ in 0..200 {
        status = h.plane.status(id).await.expect("Failed to read status");
        if status == wanted {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    status
}

/// Both targets are listed, each under its own address.
#[tokio::test]
async fn test_fetch_all_targets() {
    let h = start().await;
    h.plane.create(web_server("avi-shop", AVI, "10.0.0.10")).await.unwrap();
    h.plane
        .create(web_server("netscaler-shop", NETSCALER, "10.0.0.20"))
        .await
        .unwrap();

    let report = h.plane.fetch_all_targets().await;

    assert_eq!(report.results.len(), 2);
    let mut completed = report.completed();
    completed.sort();
    assert_eq!(completed, vec![AVI, NETSCALER]);
    let names: Vec<&str> = report.records().map(|vs: &VirtualServer| vs.name.as_str()).collect();
    assert!(names.contains(&"avi-shop"));
    assert!(names.contains(&"netscaler-shop"));
}

/// A failing target and a slow one lose only their own results.
#[tokio::test]
async fn test_fetch_all_isolates_bad_targets() {
    let (avi, netscaler) = appliances();
    let mut settings = config();
    settings.fetch.timeout_secs = 1;
    let h = start_with(avi, netscaler, settings).await;

    h.avi.fail_always(
        Method::Get,
        "/api/virtualservice",
        RpcError::Rejected {
            status: 500,
            message: "internal error".into(),
        },
    );
    h.netscaler.set_latency(Duration::from_millis(1_500));

    let report = h.plane.fetch_all_targets().await;

    assert_eq!(report.results.len(), 2);
    assert!(report.completed().is_empty());
    match report.outcome(AVI) {
        Some(TargetOutcome::Failed(reason)) => assert!(reason.contains("internal error")),
        other => panic!("expected a failure for {AVI}, got {other:?}"),
    }
    assert_eq!(report.outcome(NETSCALER), Some(&TargetOutcome::TimedOut));

    // Healthy again, the next run completes both
    h.avi.clear_failures();
    h.netscaler.set_latency(Duration::ZERO);
    let report = h.plane.fetch_all_targets().await;
    assert_eq!(report.completed().len(), 2);
}

#[tokio::test]
async fn test_background_create_and_delete() {
    let h = start().await;

    let id = h
        .plane
        .submit_create(web_server("avi-shop", AVI, "10.0.0.10"))
        .await
        .expect("Failed to submit create");
    assert_eq!(
        wait_for_status(&h, &id, Some(VsStatus::Ready)).await,
        Some(VsStatus::Ready)
    );
    let record = h.plane.record(&id).await.unwrap().expect("record stored");
    assert!(!record.source_uuid.is_empty());
    assert_eq!(h.avi.count(avi::VIRTUAL_SERVICE), 1);

    h.plane.submit_delete(&id).await.expect("Failed to submit delete");
    assert_eq!(wait_for_status(&h, &id, None).await, None);
    assert_eq!(h.avi.count(avi::VIRTUAL_SERVICE), 0);
}

/// A background job that errors leaves a failed status behind instead of vanishing.
#[tokio::test]
async fn test_background_failure_is_visible() {
    let h = start().await;

    let ghost = web_server("avi-ghost", AVI, "10.0.0.30");
    let id = h.plane.submit_modify(ghost).await.expect("Failed to submit modify");

    assert_eq!(
        wait_for_status(&h, &id, Some(VsStatus::Fail)).await,
        Some(VsStatus::Fail)
    );
}

#[tokio::test]
async fn test_rejected_submission_is_not_queued() {
    let h = start().await;
    let mut invalid = web_server("avi-empty", AVI, "10.0.0.10");
    invalid.pools.clear();

    assert!(h.plane.submit_create(invalid).await.is_err());
    assert_eq!(h.avi.mutation_count(), 0);
}

#[tokio::test]
async fn test_expired_session_is_renewed() {
    let h = start().await;
    let logins = h.fabric.logins();
    assert_eq!(logins, 2);

    h.avi.expire_sessions();
    let outcome = h
        .plane
        .create(web_server("avi-shop", AVI, "10.0.0.10"))
        .await
        .expect("Failed to create after expiry");

    assert_eq!(
        outcome.record.status,
        VsStatus::Ready,
        "last error: {:?}",
        outcome.record.last_error
    );
    assert_eq!(h.fabric.logins(), logins + 1, "exactly one re-authentication");
}

#[tokio::test]
async fn test_login_is_retried() {
    let (avi, netscaler) = appliances();
    let fabric = MockFabric::new();
    fabric.add(avi);
    fabric.add(netscaler);
    fabric.refuse_logins(2);

    let plane = ControlPlane::start(
        config(),
        fabric.clone(),
        Arc::new(StaticIpam::new()),
        Arc::new(InMemoryStore::new()),
    )
    .await
    .expect("Failed to start after transient refusals");

    assert_eq!(plane.balancers().len(), 2);
    plane.shutdown().await.expect("Failed to shut down");
}

#[tokio::test]
async fn test_unreachable_target_fails_start() {
    let (avi, _) = appliances();
    let fabric = MockFabric::new();
    fabric.add(avi);

    let result = ControlPlane::start(
        config(),
        fabric,
        Arc::new(StaticIpam::new()),
        Arc::new(InMemoryStore::new()),
    )
    .await;

    assert!(result.is_err());
}

/// Rejected credentials end startup on the first answer instead of backing off.
#[tokio::test]
async fn test_rejected_credentials_fail_start_at_once() {
    let (avi, netscaler) = appliances();
    let fabric = MockFabric::new();
    fabric.add(avi);
    fabric.add(netscaler);
    let mut settings = config();
    settings.targets[1].username.clear();
    settings.retry = RetrySettings {
        max_attempts: 5,
        initial_delay_ms: 60_000,
        max_delay_ms: 60_000,
    };

    let started = tokio::time::timeout(
        Duration::from_secs(5),
        ControlPlane::start(
            settings,
            fabric.clone(),
            Arc::new(StaticIpam::new()),
            Arc::new(InMemoryStore::new()),
        ),
    )
    .await
    .expect("start gave up without waiting on retries");

    assert!(started.is_err());
    assert_eq!(fabric.logins(), 1, "only the Avi login succeeded");
}

#[tokio::test]
async fn test_unknown_target_is_not_found() {
    let h = start().await;
    let result = h.plane.create(web_server("avi-shop", "10.99.0.1", "10.0.0.10")).await;
    assert!(matches!(result, Err(e) if e.is_not_found()));
}

#[tokio::test]
async fn test_shutdown_drains_queue() {
    let h = start().await;
    let id = h
        .plane
        .submit_create(web_server("avi-shop", AVI, "10.0.0.10"))
        .await
        .unwrap();

    let store = h.store.clone();
    h.plane.shutdown().await.expect("Failed to shut down");

    // The queued job finished before the workers stopped
    assert_eq!(store.status(&id).await.unwrap(), Some(VsStatus::Ready));
    assert_eq!(h.avi.count(avi::VIRTUAL_SERVICE), 1);
}

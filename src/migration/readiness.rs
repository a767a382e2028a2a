//! Readiness checks for a staged migration. Pure functions over records already read;
//! nothing here talks to an appliance.

use super::artifact::{
    CheckResult, DependencyPeer, DependencyStatus, PoolReadiness, ReadinessChecks,
};
use crate::model::{find_routing_context, Pool, RoutingContext, Vendor, VirtualServer};

/// Runs every check against the remapped `target` configuration.
///
/// `source_servers` is the current listing of the source appliance, used to find other
/// virtual servers answering on the same IP.
pub fn evaluate(
    source: &VirtualServer,
    target: &VirtualServer,
    contexts: &[RoutingContext],
    source_servers: &[VirtualServer],
) -> ReadinessChecks {
    let (pool_presence, pools) = check_pools(target, contexts);
    ReadinessChecks {
        ip_routing: check_ip_routing(&target.ip, contexts),
        network_service: check_network_service(target, target.vendor),
        dependency: check_dependency(source, source_servers),
        pool_presence,
        pools,
    }
}

pub fn check_ip_routing(ip: &str, contexts: &[RoutingContext]) -> CheckResult {
    if ip.is_empty() {
        return CheckResult::from_problems(vec!["virtual server has no IP".into()]);
    }
    match find_routing_context(contexts, ip) {
        Some(_) => CheckResult::pass(),
        None => {
            CheckResult::from_problems(vec![format!("no target routing context contains {ip}")])
        }
    }
}

pub fn check_network_service(vs: &VirtualServer, vendor: Vendor) -> CheckResult {
    let mut problems = Vec::new();
    if vs.service_type.is_ssl_only() {
        problems.push(format!("service type {} cannot be migrated", vs.service_type));
    } else if !vendor.supports_service(vs.service_type) {
        problems.push(format!("{vendor} does not support service type {}", vs.service_type));
    }
    if vs.port == 0 {
        problems.push("port 0 is not a valid service port".into());
    }
    if vs.service_type.terminates_tls() && vs.certificates.is_empty() {
        problems.push(format!("service type {} needs a certificate", vs.service_type));
    }
    CheckResult::from_problems(problems)
}

pub fn check_dependency(
    source: &VirtualServer,
    source_servers: &[VirtualServer],
) -> DependencyStatus {
    let peers: Vec<DependencyPeer> = source_servers
        .iter()
        .filter(|other| other.ip == source.ip && other.source_uuid != source.source_uuid)
        .map(|other| DependencyPeer {
            name: other.name.clone(),
            source_uuid: other.source_uuid.clone(),
            ip: other.ip.clone(),
            port: other.port,
        })
        .collect();
    DependencyStatus {
        ready: peers.is_empty(),
        peers,
    }
}

pub fn check_pools(
    vs: &VirtualServer,
    contexts: &[RoutingContext],
) -> (CheckResult, Vec<PoolReadiness>) {
    let presence = if vs.pools.is_empty() {
        CheckResult::from_problems(vec!["at least one pool is required".into()])
    } else {
        CheckResult::pass()
    };
    let pools = vs
        .pools
        .iter()
        .map(|pool| check_pool(pool, vs.vendor, contexts))
        .collect();
    (presence, pools)
}

fn check_pool(pool: &Pool, vendor: Vendor, contexts: &[RoutingContext]) -> PoolReadiness {
    let persistence = match &pool.persistence {
        Some(p) if !vendor.supports_persistence(p.persistence_type) => {
            CheckResult::from_problems(vec![format!(
                "{vendor} does not support {} persistence",
                p.persistence_type
            )])
        }
        _ => CheckResult::pass(),
    };

    let servers = CheckResult::from_problems(
        pool.bindings
            .iter()
            .filter(|b| find_routing_context(contexts, &b.server.ip).is_none())
            .map(|b| format!("backend {} is outside every target routing context", b.server.ip))
            .collect(),
    );

    let health_monitors = CheckResult::from_problems(
        pool.health_monitors
            .iter()
            .filter(|m| !vendor.supports_monitor(m.effective_type()))
            .map(|m| {
                format!(
                    "monitor '{}' of type {} has no {vendor} equivalent",
                    m.name,
                    m.effective_type()
                )
            })
            .collect(),
    );

    PoolReadiness {
        pool: pool.name.clone(),
        persistence,
        servers,
        health_monitors,
    }
}

//! Source-vendor configuration → target-vendor configuration.

use crate::model::{HealthMonitor, Pool, Vendor, VirtualServer};

/// `<product-code>-<name without a known vendor prefix>`.
pub fn target_name(name: &str, vendor: Vendor) -> String {
    format!("{}-{}", vendor.product_code(), Vendor::strip_product_prefix(name))
}

/// Builds the configuration the cutover creates on the target vendor.
///
/// Every appliance identity is cleared and every name re-prefixed, so the target
/// hierarchy is created fresh. The pool group is dropped; the target regroups the
/// pools itself when it has a group object. Monitors that send an HTTP request are
/// carried over as http monitors whatever they were declared as.
pub fn remap(source: &VirtualServer, vendor: Vendor) -> VirtualServer {
    let mut target = source.clone();
    target.id.clear();
    target.source_uuid.clear();
    target.source_vip_uuid.clear();
    target.name = target_name(&source.name, vendor);
    target.vendor = vendor;
    target.address.clear();
    target.routing_context = None;
    target.status = Default::default();
    target.last_error = None;
    target.enabled = true;
    target.pool_group = None;

    for pool in &mut target.pools {
        remap_pool(pool, vendor);
    }
    for certificate in &mut target.certificates {
        certificate.source_uuid.clear();
        certificate.name = target_name(&certificate.name, vendor);
    }
    target
}

fn remap_pool(pool: &mut Pool, vendor: Vendor) {
    pool.source_uuid.clear();
    pool.name = target_name(&pool.name, vendor);
    for monitor in &mut pool.health_monitors {
        remap_monitor(monitor, vendor);
    }
    if let Some(persistence) = pool.persistence.as_mut() {
        persistence.source_uuid.clear();
        persistence.name = target_name(&persistence.name, vendor);
    }
    if let Some(certificate) = pool.certificate.as_mut() {
        certificate.source_uuid.clear();
        certificate.name = target_name(&certificate.name, vendor);
    }
}

fn remap_monitor(monitor: &mut HealthMonitor, vendor: Vendor) {
    monitor.source_uuid.clear();
    monitor.name = target_name(&monitor.name, vendor);
    monitor.monitor_type = monitor.effective_type();
}

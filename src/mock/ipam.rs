use crate::collaborators::Ipam;
use crate::error::{LbError, Result};
use crate::model::Cidr;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Address management backed by memory. Hands out the lowest free host of the
/// requested network and keeps one A record per DNS name.
#[derive(Default)]
pub struct StaticIpam {
    allocated: RwLock<BTreeSet<String>>,
    records: RwLock<BTreeMap<String, String>>,
    fail_deletes: AtomicBool,
}

impl StaticIpam {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `ip` as taken so it is never handed out.
    pub async fn reserve(&self, ip: &str) {
        self.allocated.write().await.insert(ip.to_string());
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// DNS names currently resolving to `ip`.
    pub async fn names_for(&self, ip: &str) -> Vec<String> {
        self.records
            .read()
            .await
            .iter()
            .filter(|(_, target)| target.as_str() == ip)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn resolve(&self, name: &str) -> Option<String> {
        self.records.read().await.get(name).cloned()
    }

    pub async fn allocated(&self) -> Vec<String> {
        self.allocated.read().await.iter().cloned().collect()
    }
}

fn dns_name(ip: &str, product_code: &str) -> String {
    format!("{product_code}-{}.lb.internal", ip.replace('.', "-"))
}

#[async_trait]
impl Ipam for StaticIpam {
    async fn fetch_ip(&self, network: &Cidr) -> Result<String> {
        let mut allocated = self.allocated.write().await;
        let ip = network
            .hosts()
            .map(|host| host.to_string())
            .find(|host| !allocated.contains(host))
            .ok_or_else(|| LbError::Ipam(format!("{network} is exhausted")))?;
        allocated.insert(ip.clone());
        debug!(%ip, %network, "allocated");
        Ok(ip)
    }

    async fn create(
        &self,
        ip: &str,
        product_code: &str,
        existing_names: &[String],
    ) -> Result<Vec<String>> {
        let mut records = self.records.write().await;
        let mut names = existing_names.to_vec();
        let name = dns_name(ip, product_code);
        if !names.contains(&name) {
            names.push(name);
        }
        for name in &names {
            records.insert(name.clone(), ip.to_string());
        }
        self.allocated.write().await.insert(ip.to_string());
        Ok(names)
    }

    async fn delete(&self, names: &[String]) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(LbError::Ipam("DNS provider unavailable".into()));
        }
        let mut records = self.records.write().await;
        let mut allocated = self.allocated.write().await;
        for name in names {
            if let Some(ip) = records.remove(name) {
                if !records.values().any(|other| *other == ip) {
                    allocated.remove(&ip);
                }
            }
        }
        Ok(())
    }

    async fn modify(&self, ip: &str, product_code: &str, names: &[String]) -> Result<Vec<String>> {
        if names.is_empty() {
            return self.create(ip, product_code, &[]).await;
        }
        let mut records = self.records.write().await;
        for name in names {
            records.insert(name.clone(), ip.to_string());
        }
        self.allocated.write().await.insert(ip.to_string());
        Ok(names.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocates_lowest_free_host() {
        let ipam = StaticIpam::new();
        let network: Cidr = "10.0.0.0/30".parse().unwrap();
        ipam.reserve("10.0.0.1").await;

        assert_eq!(ipam.fetch_ip(&network).await.unwrap(), "10.0.0.2");
        assert!(matches!(ipam.fetch_ip(&network).await, Err(LbError::Ipam(_))));
    }

    #[tokio::test]
    async fn test_names_follow_modify_and_release_on_delete() {
        let ipam = StaticIpam::new();
        let names = ipam.create("10.0.0.5", "avi", &[]).await.unwrap();
        assert_eq!(names, vec!["avi-10-0-0-5.lb.internal".to_string()]);

        ipam.modify("10.0.0.6", "avi", &names).await.unwrap();
        assert_eq!(ipam.resolve(&names[0]).await.as_deref(), Some("10.0.0.6"));

        ipam.delete(&names).await.unwrap();
        assert!(ipam.names_for("10.0.0.6").await.is_empty());
        assert!(!ipam.allocated().await.contains(&"10.0.0.6".to_string()));
    }
}

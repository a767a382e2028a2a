use super::LoadBalancer;
use crate::error::{LbError, Result};
use crate::model::Vendor;
use std::sync::Arc;

/// The configured appliances, in configuration order.
#[derive(Clone, Default)]
pub struct Balancers {
    inner: Arc<Vec<Arc<LoadBalancer>>>,
}

impl Balancers {
    pub fn new(balancers: Vec<Arc<LoadBalancer>>) -> Self {
        Self {
            inner: Arc::new(balancers),
        }
    }

    pub fn get(&self, address: &str) -> Result<Arc<LoadBalancer>> {
        self.inner
            .iter()
            .find(|lb| lb.address() == address)
            .cloned()
            .ok_or_else(|| LbError::not_found("load-balancer", address))
    }

    /// The first configured appliance of `vendor`.
    pub fn first_of(&self, vendor: Vendor) -> Option<Arc<LoadBalancer>> {
        self.inner.iter().find(|lb| lb.vendor() == vendor).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LoadBalancer>> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

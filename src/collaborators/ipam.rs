use crate::error::Result;
use crate::model::Cidr;
use async_trait::async_trait;

/// Address allocation and DNS registration for virtual server IPs.
#[async_trait]
pub trait Ipam: Send + Sync {
    /// Next free address in `network`.
    async fn fetch_ip(&self, network: &Cidr) -> Result<String>;

    /// Registers `ip` and returns the DNS names now pointing at it, `existing_names`
    /// included.
    async fn create(
        &self,
        ip: &str,
        product_code: &str,
        existing_names: &[String],
    ) -> Result<Vec<String>>;

    async fn delete(&self, names: &[String]) -> Result<()>;

    /// Re-points `names` at `ip`.
    async fn modify(&self, ip: &str, product_code: &str, names: &[String]) -> Result<Vec<String>>;
}

//! # Multi-Target Fetch
//!
//! Fans a FetchAll out over many appliances with a fixed number of worker slots. Every
//! target gets its own time budget, counted from the moment it holds a slot, and a
//! target that fails, times out or panics only loses its own result.

use crate::config::FetchSettings;
use crate::error::Result;
use crate::lifecycle::LoadBalancer;
use crate::model::VirtualServer;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// One appliance that can list its records.
#[async_trait]
pub trait FetchTarget: Send + Sync + 'static {
    type Item: Send + 'static;

    fn address(&self) -> &str;

    async fn fetch_all(&self) -> Result<Vec<Self::Item>>;
}

#[async_trait]
impl FetchTarget for LoadBalancer {
    type Item = VirtualServer;

    fn address(&self) -> &str {
        LoadBalancer::address(self)
    }

    async fn fetch_all(&self) -> Result<Vec<VirtualServer>> {
        self.virtual_servers().fetch_all().await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetOutcome<T> {
    Fetched(Vec<T>),
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetReport<T> {
    pub address: String,
    pub outcome: TargetOutcome<T>,
}

/// Per-target results in the order targets finished.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport<T> {
    pub results: Vec<TargetReport<T>>,
}

impl<T> FetchReport<T> {
    /// Addresses that returned a listing.
    pub fn completed(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TargetOutcome::Fetched(_)))
            .map(|r| r.address.as_str())
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &T> {
        self.results.iter().flat_map(|r| match &r.outcome {
            TargetOutcome::Fetched(items) => items.as_slice(),
            _ => &[][..],
        })
    }

    pub fn outcome(&self, address: &str) -> Option<&TargetOutcome<T>> {
        self.results
            .iter()
            .find(|r| r.address == address)
            .map(|r| &r.outcome)
    }
}

#[derive(Debug, Clone)]
pub struct FetchCoordinator {
    max_concurrency: usize,
    timeout: Duration,
}

impl FetchCoordinator {
    pub fn new(max_concurrency: usize, timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            timeout,
        }
    }

    pub fn from_settings(settings: &FetchSettings) -> Self {
        Self::new(settings.max_concurrency, settings.timeout())
    }

    #[instrument(
        skip(self, targets),
        fields(targets = targets.len(), slots = self.max_concurrency)
    )]
    pub async fn fetch_all<F: FetchTarget>(&self, targets: Vec<Arc<F>>) -> FetchReport<F::Item> {
        let slots = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set = JoinSet::new();

        for target in targets {
            let slots = slots.clone();
            let budget = self.timeout;
            set.spawn(async move {
                let address = target.address().to_string();
                let outcome = match slots.acquire_owned().await {
                    Ok(_permit) => fetch_one(target, budget).await,
                    Err(_) => TargetOutcome::Failed("worker slots closed".into()),
                };
                TargetReport { address, outcome }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => {
                    match &report.outcome {
                        TargetOutcome::Fetched(items) => debug!(
                            target_address = %report.address,
                            count = items.len(),
                            "Target fetched"
                        ),
                        TargetOutcome::Failed(e) => warn!(
                            target_address = %report.address,
                            error = %e,
                            "Target fetch failed"
                        ),
                        TargetOutcome::TimedOut => {
                            warn!(target_address = %report.address, "Target fetch timed out")
                        }
                    }
                    results.push(report);
                }
                Err(e) => warn!(error = %e, "Fetch unit lost"),
            }
        }

        let report = FetchReport { results };
        info!(
            completed = report.completed().len(),
            total = report.results.len(),
            "Multi-target fetch finished"
        );
        report
    }
}

async fn fetch_one<F: FetchTarget>(target: Arc<F>, budget: Duration) -> TargetOutcome<F::Item> {
    // Own task, so a panicking driver surfaces as a JoinError for this target only.
    let worker = tokio::spawn(async move { target.fetch_all().await });
    let abort = worker.abort_handle();
    match tokio::time::timeout(budget, worker).await {
        Ok(Ok(Ok(items))) => TargetOutcome::Fetched(items),
        Ok(Ok(Err(e))) => TargetOutcome::Failed(e.to_string()),
        Ok(Err(e)) => TargetOutcome::Failed(format!("fetch task aborted: {e}")),
        Err(_) => {
            abort.abort();
            TargetOutcome::TimedOut
        }
    }
}

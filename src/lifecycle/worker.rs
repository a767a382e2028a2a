use super::LoadBalancer;
use crate::collaborators::RecordStore;
use crate::config::WorkerSettings;
use crate::error::{LbError, Result};
use crate::model::{VirtualServer, VsStatus};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// A virtual server mutation queued for a background worker.
pub enum MutationJob {
    Create {
        balancer: Arc<LoadBalancer>,
        record: VirtualServer,
    },
    Modify {
        balancer: Arc<LoadBalancer>,
        record: VirtualServer,
    },
    Delete {
        balancer: Arc<LoadBalancer>,
        record: VirtualServer,
    },
}

impl MutationJob {
    pub fn id(&self) -> &str {
        match self {
            MutationJob::Create { record, .. }
            | MutationJob::Modify { record, .. }
            | MutationJob::Delete { record, .. } => &record.id,
        }
    }

    fn operation(&self) -> &'static str {
        match self {
            MutationJob::Create { .. } => "create",
            MutationJob::Modify { .. } => "modify",
            MutationJob::Delete { .. } => "delete",
        }
    }

    async fn run(self) -> Result<VsStatus> {
        let outcome = match self {
            MutationJob::Create { balancer, record } => {
                balancer.virtual_servers().create(record).await?
            }
            MutationJob::Modify { balancer, record } => {
                balancer.virtual_servers().modify(&record).await?
            }
            MutationJob::Delete { balancer, record } => {
                balancer.virtual_servers().delete(&record).await?
            }
        };
        Ok(outcome.record.status)
    }
}

/// A fixed pool of tasks draining one mutation queue.
///
/// The orchestrators record progress in the store as they go; a job that fails before
/// reaching the appliance has its status set to `Fail` here.
pub struct MutationWorkers {
    sender: mpsc::Sender<MutationJob>,
    handles: Vec<JoinHandle<()>>,
}

impl MutationWorkers {
    pub fn start(settings: &WorkerSettings, store: Arc<dyn RecordStore>) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_depth);
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..settings.count)
            .map(|worker| {
                let receiver = receiver.clone();
                let store = store.clone();
                let span = tracing::info_span!("mutation_worker", worker);
                tokio::spawn(Self::work(receiver, store).instrument(span))
            })
            .collect();
        info!(
            workers = settings.count,
            queue_depth = settings.queue_depth,
            "Mutation workers started"
        );
        Self { sender, handles }
    }

    /// Queues a job, waiting for room when the queue is full.
    pub async fn submit(&self, job: MutationJob) -> Result<()> {
        debug!(id = %job.id(), operation = job.operation(), "Queueing mutation");
        self.sender.send(job).await.map_err(|_| LbError::QueueClosed)
    }

    async fn work(receiver: Arc<Mutex<mpsc::Receiver<MutationJob>>>, store: Arc<dyn RecordStore>) {
        loop {
            let job = receiver.lock().await.recv().await;
            let Some(job) = job else { break };

            let id = job.id().to_string();
            let operation = job.operation();
            match job.run().await {
                Ok(status) => info!(%id, operation, %status, "Mutation finished"),
                Err(e) => {
                    error!(%id, operation, error = %e, "Mutation rejected");
                    if let Err(store_error) = store.set_status(&id, VsStatus::Fail).await {
                        warn!(%id, error = %store_error, "Could not record failed status");
                    }
                }
            }
        }
        debug!("Mutation worker exiting");
    }

    /// Closes the queue and waits for queued jobs to drain.
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Mutation worker failed: {:?}", e);
            }
        }
    }
}

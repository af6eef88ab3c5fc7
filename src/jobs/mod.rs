//! Job queue: request handlers enqueue, a worker task drives the coordinator.

use crate::models::{JobStatus, SearchTarget};
use crate::pipeline::job::{JobContext, JobError};
use crate::pipeline::JobCoordinator;
use crate::storage::JobStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_id: Uuid,
    pub target: SearchTarget,
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<JobRequest>,
    jobs: Arc<dyn JobStore>,
}

impl JobQueue {
    pub fn new(capacity: usize, jobs: Arc<dyn JobStore>) -> (Self, mpsc::Receiver<JobRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, jobs }, rx)
    }

    /// Record a pending job and queue it without waiting. A full or closed
    /// queue fails the job right away.
    pub fn submit(&self, target: SearchTarget) -> Result<Uuid> {
        let status = JobStatus::new_pending(target.limit);
        let job_id = status.job_id;
        self.jobs.insert_job(&status).context("Failed to record job")?;

        if let Err(e) = self.tx.try_send(JobRequest { job_id, target }) {
            let reason = match e {
                TrySendError::Full(_) => "job queue is full",
                TrySendError::Closed(_) => "job queue is closed",
            };
            let mut ctx = JobContext::new(status, Arc::clone(&self.jobs));
            ctx.fail(reason)?;
            anyhow::bail!("job {}: {}", job_id, reason);
        }

        info!("Job {} queued", job_id);
        Ok(job_id)
    }
}

/// Run queued jobs one at a time until every sender is dropped.
pub async fn run_worker(
    mut rx: mpsc::Receiver<JobRequest>,
    coordinator: Arc<JobCoordinator>,
    jobs: Arc<dyn JobStore>,
) {
    info!("Job worker started");
    while let Some(request) = rx.recv().await {
        let status = match jobs.get_job(request.job_id) {
            Ok(Some(status)) => status,
            Ok(None) => {
                error!("{}", JobError::UnknownJob(request.job_id));
                continue;
            }
            Err(e) => {
                error!("Job {}: status lookup failed: {:#}", request.job_id, e);
                continue;
            }
        };

        let mut ctx = JobContext::new(status, Arc::clone(&jobs));
        match coordinator.run(&mut ctx, &request.target).await {
            Ok(summary) => info!(
                "Job {} completed: {} items, {} parsed",
                request.job_id, summary.discovered, summary.parsed
            ),
            Err(e) => warn!("Job {} failed: {:#}", request.job_id, e),
        }
    }
    info!("Job queue closed, worker exiting");
}

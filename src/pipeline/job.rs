//! Job status tracking.
//!
//! A `JobContext` is handed to the coordinator by reference and is the only
//! thing that writes a job's status. Every transition is persisted before the
//! in-memory copy changes, so readers always see the latest known state.

use crate::models::{JobState, JobStatus};
use crate::storage::JobStore;
use anyhow::{bail, Result};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid search target: {0}")]
    InvalidTarget(String),
    #[error("no items found for {target}")]
    NoItemsFound { target: String },
    #[error("error fetching item list: {0}")]
    Discovery(String),
    #[error("job {0} does not exist")]
    UnknownJob(Uuid),
}

pub struct JobContext {
    status: JobStatus,
    store: Arc<dyn JobStore>,
}

impl JobContext {
    pub fn new(status: JobStatus, store: Arc<dyn JobStore>) -> Self {
        Self { status, store }
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn job_id(&self) -> Uuid {
        self.status.job_id
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(JobState::Running, |_| {})
    }

    /// `scraped` is the number of discovered references.
    pub fn complete(&mut self, scraped: usize) -> Result<()> {
        self.transition(JobState::Completed, |s| s.scraped_count = scraped as i64)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.transition(JobState::Error, |s| s.error_message = Some(message))
    }

    fn transition(&mut self, next: JobState, apply: impl FnOnce(&mut JobStatus)) -> Result<()> {
        let current = self.status.state;
        if !current.can_transition_to(next) {
            bail!("job {}: illegal transition {} → {}", self.status.job_id, current, next);
        }

        let mut updated = self.status.clone();
        updated.state = next;
        apply(&mut updated);
        updated.updated_at = Utc::now().naive_utc();

        self.store.save_job(&updated)?;
        self.status = updated;
        info!("Job {}: {} → {}", self.status.job_id, current, next);
        Ok(())
    }
}

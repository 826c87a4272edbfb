//! Job Registry: live validation jobs keyed by id.
//!
//! An entry exists from `start` until the job has delivered its `end` event.
//! Insert, lookup and removal are safe to race; a stop request that loses the
//! race against natural completion resolves as a no-op.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::error::ValidationError;
use crate::core::validation::job::{JobSnapshot, JobStatus};

/// Handle the registry keeps for a live job.
#[derive(Debug, Clone)]
pub(crate) struct JobEntry {
    pub(crate) cancel: CancellationToken,
    pub(crate) state: watch::Receiver<JobSnapshot>,
}

/// Result of a stop request. Every variant is a success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live job with that id
    NotFound,
    /// The job had already reached this terminal status
    AlreadyFinished(JobStatus),
    /// The job was signalled and is now terminal with this status
    Stopped(JobStatus),
}

#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: &str, entry: JobEntry) -> Result<(), ValidationError> {
        if id.trim().is_empty() {
            return Err(ValidationError::EmptyJobId);
        }
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(id) {
            return Err(ValidationError::DuplicateJob(id.to_string()));
        }
        jobs.insert(id.to_string(), entry);
        debug!(job_id = id, "job registered");
        Ok(())
    }

    pub(crate) fn remove(&self, id: &str) {
        if self.jobs.lock().remove(id).is_some() {
            debug!(job_id = id, "job removed");
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.jobs.lock().contains_key(id)
    }

    /// Status and step index of a live job.
    pub fn snapshot(&self, id: &str) -> Option<JobSnapshot> {
        self.jobs
            .lock()
            .get(id)
            .map(|e| *e.state.borrow())
    }

    /// Ids of all live jobs, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Cancel a running job and wait until its process is gone and its `end`
    /// event has been emitted.
    pub async fn stop(&self, id: &str) -> StopOutcome {
        let entry = self.jobs.lock().get(id).cloned();
        let Some(entry) = entry else {
            debug!(job_id = id, "stop: no such job");
            return StopOutcome::NotFound;
        };

        let current = entry.state.borrow().status;
        if current.is_terminal() {
            return StopOutcome::AlreadyFinished(current);
        }

        info!(job_id = id, "stopping job");
        entry.cancel.cancel();
        StopOutcome::Stopped(wait_terminal(entry.state).await)
    }

    /// Stop every live job; used when the hosting service shuts down.
    pub async fn shutdown(&self) {
        let entries: Vec<(String, JobEntry)> = self
            .jobs
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (_, entry) in &entries {
            entry.cancel.cancel();
        }
        for (id, entry) in entries {
            let status = wait_terminal(entry.state).await;
            debug!(job_id = %id, %status, "job settled on shutdown");
        }
    }
}

async fn wait_terminal(mut state: watch::Receiver<JobSnapshot>) -> JobStatus {
    let settled = state
        .wait_for(|s| s.status.is_terminal())
        .await
        .map(|snap| snap.status);
    match settled {
        Ok(status) => status,
        // Runner task went away without publishing a terminal status
        Err(_) => {
            let last = state.borrow().status;
            if last.is_terminal() { last } else { JobStatus::Cancelled }
        }
    }
}

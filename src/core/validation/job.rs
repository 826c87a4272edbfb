use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One external command of a validation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Step {
    pub fn new<I, S>(name: impl Into<String>, command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Passed, Failed and Cancelled admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Passed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Passed => "passed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A validation job as tracked by its runner task.
#[derive(Debug, Clone)]
pub struct ValidationJob {
    pub id: String,
    pub working_dir: PathBuf,
    pub steps: Vec<Step>,
    pub status: JobStatus,
    pub current_step: usize,
}

impl ValidationJob {
    pub fn new(id: impl Into<String>, working_dir: impl Into<PathBuf>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            working_dir: working_dir.into(),
            steps,
            status: JobStatus::Pending,
            current_step: 0,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            status: self.status,
            current_step: self.steps.get(self.current_step).map(|_| self.current_step),
        }
    }
}

/// Point-in-time view of a live job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Index of the step being (or last) executed; `None` for an empty pipeline
    pub current_step: Option<usize>,
}

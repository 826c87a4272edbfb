//! Apply Executor: backup-then-write, with per-file conflict gating.
//!
//! For every path that already exists, the backup is taken before the write,
//! so [`ApplyExecutor::rollback`] can always return to the pre-apply bytes.
//! A batch is not a transaction: on the first write failure the executor stops
//! and reports what it already applied; earlier backups are left in place.

use std::fs;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::backup::BackupStore;
use crate::core::error::{PartialApply, PatchError};
use crate::core::plan::{ApplyPlan, Classification};
use crate::infra::io::write_atomic;
use crate::infra::safepath::RepoRoot;

/// One file to write. `force` overrides a `Conflict` classification for this
/// path only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRequest {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub force: bool,
}

impl ApplyRequest {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self { path: path.into(), content: content.into(), force: false }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Outcome of a batch apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Paths written, in request order
    pub applied_paths: Vec<String>,
    /// Conflicted paths left untouched because `force` was not set
    pub skipped_conflicts: Vec<String>,
    /// Paths whose previous content was saved to the backup slot
    pub backed_up: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub restored: bool,
}

#[derive(Debug, Clone)]
pub struct ApplyExecutor {
    root: RepoRoot,
    backups: BackupStore,
}

impl ApplyExecutor {
    pub fn new(root: RepoRoot) -> Self {
        let backups = BackupStore::new(root.clone());
        Self { root, backups }
    }

    pub fn with_backups(root: RepoRoot, backups: BackupStore) -> Self {
        Self { root, backups }
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Write `files` under the root.
    ///
    /// Every path is confined before the first write; an invalid path aborts
    /// the whole batch with nothing written.
    #[instrument(level = "info", skip_all, fields(files = files.len(), planned = plan.is_some()))]
    pub fn apply(
        &self,
        files: &[ApplyRequest],
        plan: Option<&ApplyPlan>,
    ) -> Result<ApplyReport, PartialApply> {
        let mut report = ApplyReport::default();

        let mut normalized = Vec::with_capacity(files.len());
        for file in files {
            match self.root.normalize(&file.path).and_then(|p| {
                self.root.resolve(&p)?;
                Ok(p)
            }) {
                Ok(p) => normalized.push(p),
                Err(source) => return Err(PartialApply { report, source }),
            }
        }

        for (file, path) in files.iter().zip(normalized) {
            let conflicted = plan
                .and_then(|p| p.entry(&path))
                .is_some_and(|e| e.classification == Classification::Conflict);
            if conflicted && !file.force {
                warn!(%path, "skipping conflicted file");
                report.skipped_conflicts.push(path);
                continue;
            }
            if conflicted {
                info!(%path, "force-applying over conflict");
            }

            match self.write_one(&path, &file.content) {
                Ok(backed_up) => {
                    if backed_up {
                        report.backed_up.push(path.clone());
                    }
                    report.applied_paths.push(path);
                }
                Err(source) => {
                    warn!(%path, error = %source, "apply halted");
                    return Err(PartialApply { report, source });
                }
            }
        }

        info!(
            applied = report.applied_paths.len(),
            skipped = report.skipped_conflicts.len(),
            "apply finished"
        );
        Ok(report)
    }

    /// Backup (if the file exists), create parents, replace the content.
    fn write_one(&self, path: &str, content: &str) -> Result<bool, PatchError> {
        let target = self.root.write_target(path)?;
        let backed_up = self.backups.save(path)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PatchError::io(path, e))?;
        }
        write_atomic(&target, content.as_bytes()).map_err(|e| PatchError::io(path, e))?;
        Ok(backed_up)
    }

    /// Restore `path` from its backup and consume the backup. A path with no
    /// backup is a no-op, not an error.
    #[instrument(level = "info", skip(self))]
    pub fn rollback(&self, path: &str) -> Result<RollbackOutcome, PatchError> {
        let path = self.root.normalize(path)?;
        let restored = self.backups.restore(&path)?;
        info!(%path, restored, "rollback");
        Ok(RollbackOutcome { restored })
    }
}

/// Requests for every entry that would change the disk. `force` lists the
/// paths whose conflicts the caller chose to override.
pub fn requests_from_plan(plan: &ApplyPlan, force: &[String]) -> Vec<ApplyRequest> {
    plan.entries
        .iter()
        .filter(|e| e.classification != Classification::Unchanged)
        .map(|e| {
            ApplyRequest::new(e.path.clone(), e.proposed_content.clone())
                .forced(force.iter().any(|f| f == &e.path))
        })
        .collect()
}

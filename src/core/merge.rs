//! Merge Resolver for conflicted files.
//!
//! No automatic line merging happens here. The caller is shown the expected,
//! current and proposed versions, supplies the final text, and decides whether
//! to force the write. The force flag travels with the single resulting
//! [`ApplyRequest`], never as a global switch.

use serde::{Deserialize, Serialize};

use crate::core::apply::ApplyRequest;
use crate::core::plan::{ApplyPlan, ProposedFile};
use crate::infra::safepath::normalize_repo_rel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub path: String,
    /// What the proposal was generated against
    pub expected: String,
    /// What is on disk now
    pub current: String,
    /// What the model proposed
    pub proposed: String,
    /// Caller-edited result; starts as the proposal
    pub merged: String,
    pub force: bool,
}

/// Open a merge session. Pure; performs no I/O.
pub fn build_merge_candidate(
    path: impl Into<String>,
    expected: impl Into<String>,
    current: impl Into<String>,
    proposed: impl Into<String>,
) -> MergeCandidate {
    let proposed = proposed.into();
    MergeCandidate {
        path: path.into(),
        expected: expected.into(),
        current: current.into(),
        merged: proposed.clone(),
        proposed,
        force: false,
    }
}

impl MergeCandidate {
    pub fn set_merged(&mut self, merged: impl Into<String>) {
        self.merged = merged.into();
    }

    pub fn set_force(&mut self, force: bool) {
        self.force = force;
    }

    pub fn with_merged(mut self, merged: impl Into<String>) -> Self {
        self.set_merged(merged);
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.set_force(force);
        self
    }

    /// Whether the caller changed anything relative to the proposal.
    pub fn is_edited(&self) -> bool {
        self.merged != self.proposed
    }

    /// Close the session into a request for the Apply Executor.
    pub fn finalize(self) -> ApplyRequest {
        ApplyRequest { path: self.path, content: self.merged, force: self.force }
    }
}

/// One candidate per `Conflict` entry in `plan`, in plan order.
///
/// `files` supplies the expected baselines, which the plan does not carry.
pub fn candidates(files: &[ProposedFile], plan: &ApplyPlan) -> Vec<MergeCandidate> {
    plan.conflicts()
        .filter_map(|entry| {
            let file = files.iter().find(|f| same_path(&f.path, &entry.path))?;
            Some(build_merge_candidate(
                entry.path.clone(),
                file.expected_content.clone().unwrap_or_default(),
                entry.current_content.clone().unwrap_or_default(),
                entry.proposed_content.clone(),
            ))
        })
        .collect()
}

fn same_path(raw: &str, normalized: &str) -> bool {
    normalize_repo_rel(raw)
        .map(|p| p == std::path::Path::new(normalized))
        .unwrap_or(false)
}

//! Patch Planner: classify proposed files against the repository.
//!
//! Planning only reads. For a fixed filesystem state the same batch always
//! produces the same [`ApplyPlan`].

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use tracing::{debug, instrument};

use crate::core::baseline::BaselineStore;
use crate::core::error::PatchError;
use crate::infra::safepath::RepoRoot;

/// A change as proposed by the model, with the content it was generated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedFile {
    /// Repo-relative path
    pub path: String,
    pub proposed_content: String,
    /// Snapshot the proposal assumed was on disk. `None` means no baseline was
    /// given, which is distinct from an empty file.
    pub expected_content: Option<String>,
}

impl ProposedFile {
    pub fn new(path: impl Into<String>, proposed: impl Into<String>) -> Self {
        Self { path: path.into(), proposed_content: proposed.into(), expected_content: None }
    }

    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected_content = Some(expected.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Create,
    Update,
    Unchanged,
    Conflict,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::Create => "create",
            Classification::Update => "update",
            Classification::Unchanged => "unchanged",
            Classification::Conflict => "conflict",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Normalized repo-relative path (`a/b/c`)
    pub path: String,
    pub classification: Classification,
    /// `None` when the file does not exist yet
    pub current_content: Option<String>,
    pub proposed_content: String,
    /// `blake3:<hex>` of the current bytes, if any
    pub current_fingerprint: Option<String>,
    /// Lines added going from current to proposed
    pub added: usize,
    /// Lines removed going from current to proposed
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub unchanged: usize,
    pub conflict: usize,
}

impl PlanSummary {
    fn record(&mut self, c: Classification) {
        match c {
            Classification::Create => self.create += 1,
            Classification::Update => self.update += 1,
            Classification::Unchanged => self.unchanged += 1,
            Classification::Conflict => self.conflict += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.create + self.update + self.unchanged + self.conflict
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPlan {
    pub entries: Vec<PlanEntry>,
    pub summary: PlanSummary,
}

impl ApplyPlan {
    fn from_entries(entries: Vec<PlanEntry>) -> Self {
        let mut summary = PlanSummary::default();
        for e in &entries {
            summary.record(e.classification);
        }
        Self { entries, summary }
    }

    /// First entry for a normalized path.
    pub fn entry(&self, path: &str) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|e| e.classification == Classification::Conflict)
    }

    pub fn has_conflicts(&self) -> bool {
        self.summary.conflict > 0
    }
}

/// Classification rule, in precedence order.
///
/// Drift is ignored when the disk already holds the proposed content: a file
/// whose baseline moved but now equals the proposal is `Unchanged`, not
/// `Conflict`. This is a deliberate policy to avoid prompting for a merge that
/// would be a no-op.
pub fn classify(expected: Option<&str>, current: Option<&str>, proposed: &str) -> Classification {
    let Some(current) = current else {
        return Classification::Create;
    };
    if proposed == current {
        return Classification::Unchanged;
    }
    match expected {
        None => Classification::Update,
        Some(expected) if expected == current => Classification::Update,
        Some(_) => Classification::Conflict,
    }
}

/// Classify every proposed file against the content under `root`.
#[instrument(level = "debug", skip_all, fields(files = files.len(), root = %root.path().display()))]
pub fn plan(files: &[ProposedFile], root: &RepoRoot) -> Result<ApplyPlan, PatchError> {
    let store = BaselineStore::new(root.clone());
    let mut entries = Vec::with_capacity(files.len());

    for file in files {
        let path = root.normalize(&file.path)?;
        let baseline = store.read(&path)?;
        let current = baseline.as_ref().map(|b| b.content.as_str());

        let classification =
            classify(file.expected_content.as_deref(), current, &file.proposed_content);
        let (added, removed) = line_stats(current.unwrap_or(""), &file.proposed_content);
        debug!(%path, %classification, added, removed, "classified");

        entries.push(PlanEntry {
            path,
            classification,
            current_fingerprint: baseline.as_ref().map(|b| b.fingerprint.clone()),
            current_content: baseline.map(|b| b.content),
            proposed_content: file.proposed_content.clone(),
            added,
            removed,
        });
    }

    Ok(ApplyPlan::from_entries(entries))
}

/// Count inserted and deleted lines between two texts.
fn line_stats(old: &str, new: &str) -> (usize, usize) {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .fold((0, 0), |(add, del), change| match change.tag() {
            ChangeTag::Insert => (add + 1, del),
            ChangeTag::Delete => (add, del + 1),
            ChangeTag::Equal => (add, del),
        })
}

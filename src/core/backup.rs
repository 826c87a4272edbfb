//! Single-slot backup store with sibling files.
//!
//! A backup of `src/app.ts` lives at `src/app.ts.bak.devpilot`, so it can be
//! located again from `(repo_root, path)` alone. Each path has at most one
//! backup: a new save overwrites the previous one, and a restore consumes it.
//!
//! Two concurrent applies to the same path race on this slot. Callers must not
//! issue them; nothing here serializes access.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::debug;

use crate::core::error::PatchError;
use crate::infra::safepath::RepoRoot;

/// Default suffix appended to the file name of a backed-up file.
pub const BACKUP_SUFFIX: &str = ".bak.devpilot";

#[derive(Debug, Clone)]
pub struct BackupStore {
    root: RepoRoot,
    suffix: String,
}

impl BackupStore {
    pub fn new(root: RepoRoot) -> Self {
        Self::with_suffix(root, BACKUP_SUFFIX)
    }

    pub fn with_suffix(root: RepoRoot, suffix: impl Into<String>) -> Self {
        Self { root, suffix: suffix.into() }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Absolute location of the backup slot for `rel`.
    pub fn locate(&self, rel: &str) -> Result<PathBuf, PatchError> {
        let abs = self.root.resolve(rel)?;
        let mut name: OsString = abs
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| PatchError::invalid_path(rel, "path has no file name"))?;
        name.push(&self.suffix);
        Ok(abs.with_file_name(name))
    }

    /// Copy the current bytes of `rel` into its slot, replacing any previous
    /// backup. Returns `false` when there is no file to back up.
    pub fn save(&self, rel: &str) -> Result<bool, PatchError> {
        let source = self.root.resolve(rel)?;
        let slot = self.locate(rel)?;
        match fs::copy(&source, &slot) {
            Ok(bytes) => {
                debug!(path = rel, bytes, "backup saved");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound && !source.exists() => Ok(false),
            Err(e) => Err(PatchError::io(rel, e)),
        }
    }

    /// Whether a live backup exists for `rel`.
    pub fn exists(&self, rel: &str) -> Result<bool, PatchError> {
        Ok(self.locate(rel)?.is_file())
    }

    /// Raw backup bytes for `rel`, if any.
    pub fn read(&self, rel: &str) -> Result<Option<Vec<u8>>, PatchError> {
        let slot = self.locate(rel)?;
        match fs::read(&slot) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PatchError::io(rel, e)),
        }
    }

    /// Move the backup back over `rel` and consume it. Returns `false` when no
    /// backup exists.
    pub fn restore(&self, rel: &str) -> Result<bool, PatchError> {
        let target = self.root.resolve(rel)?;
        let slot = self.locate(rel)?;
        if !slot.is_file() {
            return Ok(false);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PatchError::io(rel, e))?;
        }
        fs::copy(&slot, &target).map_err(|e| PatchError::io(rel, e))?;
        fs::remove_file(&slot).map_err(|e| PatchError::io(rel, e))?;
        debug!(path = rel, "backup restored");
        Ok(true)
    }
}

//! Repository-root confinement.
//!
//! Every path handed to the core is repo-relative. [`RepoRoot::resolve`] rejects
//! absolute paths, `..` segments that climb above the root, and symlinked
//! ancestors whose real location lies outside the root, all before any write.

use std::path::{Component, Path, PathBuf};

use crate::core::error::PatchError;

/// Canonical repository root; the only way the core turns relative paths into
/// filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRoot {
    root: PathBuf,
}

impl RepoRoot {
    /// Canonicalize `path`; it must exist and be a directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, PatchError> {
        let path = path.as_ref();
        let root = dunce::canonicalize(path)
            .map_err(|e| PatchError::io(path.display().to_string(), e))?;
        if !root.is_dir() {
            return Err(PatchError::invalid_path(
                path.display().to_string(),
                "repository root is not a directory",
            ));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Lexically normalize a repo-relative path to `a/b/c` form.
    pub fn normalize(&self, rel: &str) -> Result<String, PatchError> {
        normalize_repo_rel(rel)
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
    }

    /// Join `rel` onto the root after confinement checks.
    pub fn resolve(&self, rel: &str) -> Result<PathBuf, PatchError> {
        let normalized = normalize_repo_rel(rel)?;
        let joined = self.root.join(&normalized);

        // Follow symlinks on the deepest existing ancestor (or the file itself)
        let mut cursor = joined.as_path();
        loop {
            if cursor.symlink_metadata().is_ok() {
                let real = dunce::canonicalize(cursor).map_err(|e| PatchError::io(rel, e))?;
                if !real.starts_with(&self.root) {
                    return Err(PatchError::invalid_path(
                        rel,
                        "resolves outside the repository root through a symlink",
                    ));
                }
                break;
            }
            match cursor.parent() {
                Some(parent) if parent.starts_with(&self.root) => cursor = parent,
                _ => break,
            }
        }

        Ok(joined)
    }

    /// Where a write to `rel` lands. A symlinked file is written through to
    /// its (already confined) target so the link itself is kept.
    pub fn write_target(&self, rel: &str) -> Result<PathBuf, PatchError> {
        let joined = self.resolve(rel)?;
        match joined.symlink_metadata() {
            Ok(meta) if meta.file_type().is_symlink() => {
                dunce::canonicalize(&joined).map_err(|e| PatchError::io(rel, e))
            }
            _ => Ok(joined),
        }
    }
}

/// Validate that the given path is repo-relative and non-escaping.
pub fn normalize_repo_rel(rel: &str) -> Result<PathBuf, PatchError> {
    if rel.trim().is_empty() {
        return Err(PatchError::invalid_path(rel, "empty path"));
    }
    let p = Path::new(rel);
    if p.is_absolute() {
        return Err(PatchError::invalid_path(rel, "path must be repo-relative"));
    }

    let mut out: Vec<&std::ffi::OsStr> = Vec::new();
    for c in p.components() {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if out.pop().is_none() {
                    return Err(PatchError::invalid_path(rel, "escapes repository root"));
                }
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(PatchError::invalid_path(rel, "path must be repo-relative"));
            }
        }
    }
    if out.is_empty() {
        return Err(PatchError::invalid_path(rel, "path names the repository root"));
    }
    Ok(out.into_iter().collect())
}

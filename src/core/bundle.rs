//! Parser for pasted patch bundles.
//!
//! Accepted shape (optionally wrapped in a ```json fence):
//!
//! ```json
//! { "files": [ { "path": "src/app.ts", "code": "...", "expected": "..." } ] }
//! ```
//!
//! `code` may also be spelled `content` or `proposed`; `expected` may be spelled
//! `baseline`. A missing `expected` means no baseline was captured.

use std::collections::HashSet;

use serde::Deserialize;

use crate::core::plan::ProposedFile;
use crate::infra::safepath::normalize_repo_rel;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("bundle is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bundle must contain a 'files' array")]
    MissingFiles,

    #[error("file #{0} has an empty path")]
    EmptyPath(usize),

    #[error("path {0} appears more than once")]
    DuplicatePath(String),
}

#[derive(Deserialize)]
struct RawBundle {
    files: Option<Vec<RawFile>>,
}

#[derive(Deserialize)]
struct RawFile {
    path: String,
    #[serde(alias = "content", alias = "proposed")]
    code: String,
    #[serde(default, alias = "baseline")]
    expected: Option<String>,
}

/// Parse bundle text into proposed files, preserving order.
pub fn parse_bundle(text: &str) -> Result<Vec<ProposedFile>, BundleError> {
    let body = strip_fence(text);
    let raw: RawBundle = serde_json::from_str(body)?;
    let files = raw.files.ok_or(BundleError::MissingFiles)?;

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(files.len());
    for (i, f) in files.into_iter().enumerate() {
        if f.path.trim().is_empty() {
            return Err(BundleError::EmptyPath(i));
        }
        // Duplicates are detected on the normalized form; invalid paths are
        // left for the planner to reject with a proper InvalidPath.
        let key = normalize_repo_rel(&f.path)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| f.path.clone());
        if !seen.insert(key) {
            return Err(BundleError::DuplicatePath(f.path));
        }
        out.push(ProposedFile {
            path: f.path,
            proposed_content: f.code,
            expected_content: f.expected,
        });
    }
    Ok(out)
}

/// Drop a surrounding markdown code fence, if present.
fn strip_fence(text: &str) -> &str {
    let t = text.trim();
    if !t.starts_with("```") {
        return t;
    }
    let Some(first_nl) = t.find('\n') else {
        return t;
    };
    let inner = &t[first_nl + 1..];
    inner
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(inner)
        .trim()
}

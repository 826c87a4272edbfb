//! Error taxonomy for planning, applying and validating.
//!
//! Library surfaces return these typed errors; the CLI wraps them in `anyhow`
//! and maps them back to exit codes in [`finish_with_exit`].

use std::io;

use crate::core::apply::ApplyReport;

/// Errors raised by the planner, the executor and the backing stores.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// A repo-relative path resolves outside the repository root.
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Read/write/copy failure, including files that are not UTF-8 text.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl PatchError {
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        PatchError::InvalidPath { path: path.into(), reason: reason.into() }
    }

    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        PatchError::Io { path: path.into(), source }
    }

    /// Path the error refers to.
    pub fn path(&self) -> &str {
        match self {
            PatchError::InvalidPath { path, .. } | PatchError::Io { path, .. } => path,
        }
    }
}

/// A batch apply that stopped early. Carries everything that did happen.
#[derive(Debug, thiserror::Error)]
#[error("apply halted at {}: {source}", source.path())]
pub struct PartialApply {
    /// Paths written (and skipped) before the failure
    pub report: ApplyReport,
    #[source]
    pub source: PatchError,
}

/// Errors raised when starting validation jobs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("validation job {0} is already running")]
    DuplicateJob(String),

    #[error("validation job id must not be empty")]
    EmptyJobId,
}

/// Domain-specific error taxonomy for exit-code mapping
#[derive(thiserror::Error, Debug, Clone)]
pub enum CliError {
    /// Unusable or malformed bundle / arguments
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Repository root or path confinement problems
    #[error("repository issue: {0}")]
    Repo(String),

    /// Files skipped because of unresolved conflicts
    #[error("conflicts: {0}")]
    Conflicts(String),

    /// A validation job ended Failed or Cancelled
    #[error("validation: {0}")]
    Validation(String),

    /// I/O failures and unexpected bugs
    #[error("internal error: {0}")]
    Internal(String),
}

/// 0=success, 1=validation, 2=conflict, 3=invalid, 4=repo, 5=internal
pub fn exit_code_for(e: &CliError) -> i32 {
    match e {
        CliError::Validation(_) => 1,
        CliError::Conflicts(_) => 2,
        CliError::InvalidInput(_) => 3,
        CliError::Repo(_) => 4,
        CliError::Internal(_) => 5,
    }
}

/// Classify an arbitrary error chain into a [`CliError`].
pub fn normalize_err(e: &anyhow::Error) -> CliError {
    if let Some(cli) = e.downcast_ref::<CliError>() {
        return cli.clone();
    }

    let msg = format!("{e:#}");
    if let Some(patch) = e.downcast_ref::<PatchError>() {
        return match patch {
            PatchError::InvalidPath { .. } => CliError::Repo(msg),
            PatchError::Io { .. } => CliError::Internal(msg),
        };
    }
    if let Some(partial) = e.downcast_ref::<PartialApply>() {
        return match partial.source {
            PatchError::InvalidPath { .. } => CliError::Repo(msg),
            PatchError::Io { .. } => CliError::Internal(msg),
        };
    }
    if e.downcast_ref::<ValidationError>().is_some()
        || e.downcast_ref::<crate::core::bundle::BundleError>().is_some()
    {
        return CliError::InvalidInput(msg);
    }
    CliError::Internal(msg)
}

/// Convert Result<()> to exit codes for CLI harness
pub fn finish_with_exit(result: anyhow::Result<()>) -> ! {
    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let typed = normalize_err(&e);
            eprintln!("{typed}");
            std::process::exit(exit_code_for(&typed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            exit_code_for(&CliError::Validation(String::new())),
            exit_code_for(&CliError::Conflicts(String::new())),
            exit_code_for(&CliError::InvalidInput(String::new())),
            exit_code_for(&CliError::Repo(String::new())),
            exit_code_for(&CliError::Internal(String::new())),
        ];
        assert_eq!(codes, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn invalid_path_maps_to_repo() {
        let err = anyhow::Error::new(PatchError::invalid_path("../x", "escapes repository root"));
        assert!(matches!(normalize_err(&err), CliError::Repo(_)));
    }

    #[test]
    fn wrapped_cli_error_is_preserved() {
        let err = anyhow::Error::new(CliError::Conflicts("1 file skipped".into()))
            .context("applying bundle");
        assert!(matches!(normalize_err(&err), CliError::Conflicts(_)));
    }
}

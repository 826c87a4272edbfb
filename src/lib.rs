//! **devpilot** - Review, apply and validate AI-generated code changes
//!
//! Classifies pasted file changes against the real repository state, writes them
//! with single-slot rollback backups, and runs lint/test/build steps as cancellable,
//! streamed validation jobs.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Core engine - planning, applying, merging and validating changes
pub mod core {
    /// Typed errors and CLI exit-code mapping
    pub mod error;
    pub use error::{CliError, PartialApply, PatchError, ValidationError};

    /// Current on-disk content and fingerprints (text only, binary rejected)
    pub mod baseline;
    pub use baseline::{Baseline, BaselineStore};

    /// Single-slot sibling backups (`<file>.bak.devpilot`)
    pub mod backup;
    pub use backup::BackupStore;

    /// Create/Update/Unchanged/Conflict classification of proposed files
    pub mod plan;
    pub use plan::{ApplyPlan, Classification, PlanEntry, PlanSummary, ProposedFile};

    /// Backup-then-write executor and rollback
    pub mod apply;
    pub use apply::{ApplyExecutor, ApplyReport, ApplyRequest, RollbackOutcome};

    /// Manual three-way merge sessions for conflicted files
    pub mod merge;
    pub use merge::MergeCandidate;

    /// Pasted patch bundle parsing (`{"files": [...]}`)
    pub mod bundle;
    pub use bundle::parse_bundle;

    /// Sequential, streamed, cancellable validation jobs
    pub mod validation;
    pub use validation::{
        EventBus, EventSink, JobRegistry, JobStatus, Step, ValidationEvent, ValidationRunner,
    };
}

/// Command handlers wiring the CLI to the core
pub mod cli_ext {
    /// plan / apply / merge / rollback
    pub mod patch_cmd;

    /// validate
    pub mod validate_cmd;
}

/// Infrastructure - Configuration, path confinement and I/O
pub mod infra {
    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config_from};

    /// Repository-root confinement for relative paths
    pub mod safepath;
    pub use safepath::RepoRoot;

    /// Atomic writes and input sources (file, stdin, clipboard)
    pub mod io;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, RepoRoot, load_config_from};

// Core types for external consumers
pub use core::{
    ApplyExecutor, ApplyPlan, ApplyReport, ApplyRequest, BackupStore, Classification, EventBus,
    JobStatus, MergeCandidate, PlanEntry, ProposedFile, Step, ValidationEvent, ValidationRunner,
    parse_bundle,
};

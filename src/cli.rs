use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug, Default)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "devpilot")]
#[command(about = "Review, apply and validate AI-generated code changes against your repository")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without writing anything
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug-level logging on stderr (overridden by DEVPILOT_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            no_color: self.no_color,
            dry_run: self.dry_run,
            verbose: self.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify each file of a bundle as create/update/unchanged/conflict
    Plan(PlanArgs),

    /// Write a bundle to disk, backing up every file it replaces
    Apply(ApplyArgs),

    /// Resolve one conflicted file by hand and write the result
    Merge(MergeArgs),

    /// Restore files from their backups
    Rollback(RollbackArgs),

    /// Run lint/test/build steps as a streamed validation job
    Validate(ValidateArgs),

    /// Initialize a devpilot.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Where the bundle comes from and which repository it targets
#[derive(Debug, Args)]
pub struct BundleSource {
    /// Bundle file (`{"files":[{"path","code","expected"}]}`); `-` reads stdin
    pub bundle: Option<PathBuf>,

    /// Read the bundle from the clipboard
    #[arg(long, conflicts_with = "bundle")]
    pub from_clipboard: bool,

    /// Repository root (default: git toplevel of the current directory)
    #[arg(long)]
    pub repo_root: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: BundleSource,

    /// Emit the plan as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub source: BundleSource,

    /// Overwrite this conflicted path anyway (repeatable)
    #[arg(long, value_name = "PATH")]
    pub force: Vec<String>,

    /// Emit the apply report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct MergeArgs {
    #[command(flatten)]
    pub source: BundleSource,

    /// Bundle path to resolve
    #[arg(long)]
    pub path: String,

    /// File holding the hand-merged content (default: the proposed content)
    #[arg(long)]
    pub merged: Option<PathBuf>,

    /// Write even though the file drifted from its expected baseline
    #[arg(long)]
    pub force: bool,

    /// Emit the apply report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct RollbackArgs {
    /// Repository-relative paths to restore
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Repository root (default: git toplevel of the current directory)
    #[arg(long)]
    pub repo_root: Option<PathBuf>,

    /// Emit results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct ValidateArgs {
    /// Working directory for every step
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Step as NAME=COMMAND [ARGS...]; repeatable, runs in order
    #[arg(long = "step", value_name = "NAME=CMD")]
    pub steps: Vec<String>,

    /// Job identifier (default: random UUID)
    #[arg(long)]
    pub job_id: Option<String>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}

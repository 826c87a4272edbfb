//! CLI handlers for `plan`, `apply`, `merge` and `rollback`.
//!
//! Each handler reads the bundle, resolves the repository root, and drives the
//! core engine. Human output is a table on stdout; `--json` prints one JSON
//! object instead. Failures are returned as `anyhow` errors carrying a typed
//! [`CliError`] or engine error so `main` can map them to exit codes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use owo_colors::OwoColorize;
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::{debug, instrument};

use crate::cli::{AppContext, ApplyArgs, BundleSource, MergeArgs, PlanArgs, RollbackArgs};
use crate::core::apply::{ApplyExecutor, ApplyReport, requests_from_plan};
use crate::core::backup::BackupStore;
use crate::core::bundle::parse_bundle;
use crate::core::error::CliError;
use crate::core::merge::candidates;
use crate::core::plan::{ApplyPlan, Classification, ProposedFile, plan};
use crate::infra::config::{Config, load_config_from};
use crate::infra::io::read_input;
use crate::infra::safepath::RepoRoot;

/// Repository root: explicit override, then git toplevel, then nearest
/// ancestor holding `.git`, then `start` itself.
pub fn discover_repo_root(explicit: Option<PathBuf>, start: &Path) -> PathBuf {
    if let Some(root) = explicit {
        return root;
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(start)
        .output()
    {
        if output.status.success() {
            let s = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !s.is_empty() {
                return PathBuf::from(s);
            }
        }
    }

    let mut cur = Some(start);
    while let Some(dir) = cur {
        if dir.join(".git").exists() {
            return dir.to_path_buf();
        }
        cur = dir.parent();
    }

    start.to_path_buf()
}

fn open_root(explicit: Option<PathBuf>) -> Result<RepoRoot> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let dir = discover_repo_root(explicit, &cwd);
    debug!(root = %dir.display(), "repository root");
    RepoRoot::new(&dir).map_err(|e| CliError::Repo(e.to_string()).into())
}

fn load_bundle(source: &BundleSource) -> Result<(RepoRoot, Vec<ProposedFile>)> {
    let text = read_input(source.bundle.as_deref(), source.from_clipboard)?;
    let files = parse_bundle(&text)?;
    if files.is_empty() {
        return Err(CliError::InvalidInput("bundle contains no files".into()).into());
    }
    let root = open_root(source.repo_root.clone())?;
    Ok((root, files))
}

fn executor(root: RepoRoot, cfg: &Config) -> ApplyExecutor {
    let backups = BackupStore::with_suffix(root.clone(), cfg.backup_suffix.clone());
    ApplyExecutor::with_backups(root, backups)
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "+")]
    added: usize,
    #[tabled(rename = "-")]
    removed: usize,
}

fn paint(class: Classification, ctx: &AppContext) -> String {
    let label = class.as_str();
    if ctx.no_color {
        return label.to_string();
    }
    match class {
        Classification::Create => label.green().to_string(),
        Classification::Update => label.cyan().to_string(),
        Classification::Unchanged => label.dimmed().to_string(),
        Classification::Conflict => label.red().bold().to_string(),
    }
}

fn print_plan(plan: &ApplyPlan, ctx: &AppContext) {
    let rows: Vec<PlanRow> = plan
        .entries
        .iter()
        .map(|e| PlanRow {
            path: e.path.clone(),
            status: paint(e.classification, ctx),
            added: e.added,
            removed: e.removed,
        })
        .collect();
    println!("{}", Table::new(rows));

    let s = &plan.summary;
    println!(
        "{} files: {} create, {} update, {} unchanged, {} conflict",
        s.total(),
        s.create,
        s.update,
        s.unchanged,
        s.conflict
    );
}

fn print_report(report: &ApplyReport, ctx: &AppContext) {
    if ctx.quiet {
        return;
    }
    let ok = if ctx.no_color { "applied".to_string() } else { "applied".green().to_string() };
    let skip = if ctx.no_color { "skipped".to_string() } else { "skipped".yellow().to_string() };

    for path in &report.applied_paths {
        let note = if report.backed_up.contains(path) { " (backup saved)" } else { "" };
        println!("{ok} {path}{note}");
    }
    for path in &report.skipped_conflicts {
        println!("{skip} {path} (conflict)");
    }
}

fn conflicts_error(report: &ApplyReport, hint: &str) -> anyhow::Error {
    CliError::Conflicts(format!(
        "{} file(s) skipped: {}; {hint}",
        report.skipped_conflicts.len(),
        report.skipped_conflicts.join(", ")
    ))
    .into()
}

#[instrument(skip_all)]
pub fn plan_run(args: PlanArgs, ctx: &AppContext) -> Result<()> {
    let (root, files) = load_bundle(&args.source)?;
    let plan = plan(&files, &root)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else if !ctx.quiet {
        print_plan(&plan, ctx);
    }
    Ok(())
}

#[instrument(skip_all)]
pub fn apply_run(args: ApplyArgs, ctx: &AppContext) -> Result<()> {
    let (root, files) = load_bundle(&args.source)?;
    let cfg = load_config_from(root.path())?;
    let plan = plan(&files, &root)?;

    let force = args
        .force
        .iter()
        .map(|p| root.normalize(p))
        .collect::<Result<Vec<_>, _>>()?;
    for path in &force {
        if plan.entry(path).is_none() {
            return Err(CliError::InvalidInput(format!("--force {path}: not in the bundle")).into());
        }
    }

    if ctx.dry_run {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print_plan(&plan, ctx);
            println!("dry run: nothing written");
        }
        return Ok(());
    }

    let requests = requests_from_plan(&plan, &force);
    let report = match executor(root, &cfg).apply(&requests, Some(&plan)) {
        Ok(report) => report,
        Err(partial) => {
            print_report(&partial.report, ctx);
            return Err(partial.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, ctx);
    }

    if report.skipped_conflicts.is_empty() {
        Ok(())
    } else {
        Err(conflicts_error(&report, "resolve with `devpilot merge` or pass --force PATH"))
    }
}

#[instrument(skip_all, fields(path = %args.path))]
pub fn merge_run(args: MergeArgs, ctx: &AppContext) -> Result<()> {
    let (root, files) = load_bundle(&args.source)?;
    let cfg = load_config_from(root.path())?;
    let plan = plan(&files, &root)?;
    let target = root.normalize(&args.path)?;

    let Some(mut candidate) = candidates(&files, &plan).into_iter().find(|c| c.path == target)
    else {
        let status = plan
            .entry(&target)
            .map(|e| e.classification.as_str())
            .unwrap_or("not in the bundle");
        return Err(CliError::InvalidInput(format!("{target} is not conflicted ({status})")).into());
    };

    if let Some(file) = &args.merged {
        let text = fs::read_to_string(file)
            .with_context(|| format!("Failed to read merged content: {}", file.display()))?;
        candidate.set_merged(text);
    }
    candidate.set_force(args.force);

    if ctx.dry_run {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&candidate)?);
        } else {
            println!(
                "dry run: would {} {} ({})",
                if candidate.force { "write" } else { "skip" },
                candidate.path,
                if candidate.is_edited() { "hand-merged" } else { "proposed content" }
            );
        }
        return Ok(());
    }

    let request = candidate.finalize();
    let report = executor(root, &cfg).apply(std::slice::from_ref(&request), Some(&plan))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, ctx);
    }

    if report.skipped_conflicts.is_empty() {
        Ok(())
    } else {
        Err(conflicts_error(&report, "pass --force to write the merged content"))
    }
}

#[instrument(skip_all)]
pub fn rollback_run(args: RollbackArgs, ctx: &AppContext) -> Result<()> {
    let root = open_root(args.repo_root.clone())?;
    let cfg = load_config_from(root.path())?;
    let executor = executor(root.clone(), &cfg);

    // Keyed by normalized path so repeated arguments restore once
    let mut results: IndexMap<String, bool> = IndexMap::new();
    for raw in &args.paths {
        let path = root.normalize(raw)?;
        if results.contains_key(&path) {
            continue;
        }
        let restored = if ctx.dry_run {
            executor.backups().exists(&path)?
        } else {
            executor.rollback(&path)?.restored
        };
        results.insert(path, restored);
    }

    if args.json {
        let out: Vec<_> = results
            .iter()
            .map(|(path, restored)| json!({ "path": path, "restored": restored }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !ctx.quiet {
        let verb = if ctx.dry_run { "would restore" } else { "restored" };
        for (path, restored) in &results {
            if *restored {
                let verb = if ctx.no_color { verb.to_string() } else { verb.green().to_string() };
                println!("{verb} {path}");
            } else {
                println!("no backup for {path}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_root_wins() {
        let tmp = TempDir::new().unwrap();
        let explicit = tmp.path().join("elsewhere");
        assert_eq!(discover_repo_root(Some(explicit.clone()), tmp.path()), explicit);
    }

    #[test]
    fn finds_git_marker_in_ancestor() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join(".git")).unwrap();
        let nested = tmp.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let found = dunce::canonicalize(discover_repo_root(None, &nested)).unwrap();
        assert_eq!(found, dunce::canonicalize(tmp.path()).unwrap());
    }

    #[test]
    fn plain_labels_without_color() {
        let ctx = AppContext { no_color: true, ..AppContext::default() };
        assert_eq!(paint(Classification::Conflict, &ctx), "conflict");
    }
}

//! Default validation pipelines derived from project files.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::core::validation::job::Step;

/// Scripts run for a Node project, in order, when `package.json` defines them.
const NODE_SCRIPTS: [&str; 3] = ["lint", "test", "build"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackageManager {
    Npm,
    Pnpm,
    Yarn,
    Bun,
}

impl PackageManager {
    fn detect(dir: &Path) -> Self {
        if dir.join("pnpm-lock.yaml").is_file() {
            PackageManager::Pnpm
        } else if dir.join("yarn.lock").is_file() {
            PackageManager::Yarn
        } else if dir.join("bun.lockb").is_file() {
            PackageManager::Bun
        } else {
            PackageManager::Npm
        }
    }

    fn program(self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pnpm => "pnpm",
            PackageManager::Yarn => "yarn",
            PackageManager::Bun => "bun",
        }
    }

    fn script_step(self, script: &str) -> Step {
        let mut args = vec!["run".to_string(), script.to_string()];
        if self == PackageManager::Npm && script == "test" {
            // Keep watch-mode test runners from hanging the job
            args.extend(["--".to_string(), "--watch=false".to_string()]);
        }
        Step::new(script, self.program(), args)
    }
}

#[derive(Deserialize, Default)]
struct PackageJson {
    #[serde(default)]
    scripts: serde_json::Map<String, serde_json::Value>,
}

/// Detect a lint/test/build pipeline for the project in `dir`.
///
/// A `package.json` wins over `Cargo.toml`. Returns an empty list when nothing
/// is recognised.
pub fn detect_steps(dir: &Path) -> Vec<Step> {
    let manifest = dir.join("package.json");
    if manifest.is_file() {
        let pkg: PackageJson = fs::read_to_string(&manifest)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        let pm = PackageManager::detect(dir);
        debug!(package_manager = pm.program(), "detected node project");
        return NODE_SCRIPTS
            .iter()
            .filter(|s| pkg.scripts.contains_key(**s))
            .map(|s| pm.script_step(s))
            .collect();
    }

    if dir.join("Cargo.toml").is_file() {
        debug!("detected cargo project");
        return vec![
            Step::new("clippy", "cargo", ["clippy", "--all-targets", "--", "-D", "warnings"]),
            Step::new("test", "cargo", ["test"]),
            Step::new("build", "cargo", ["build"]),
        ];
    }

    Vec::new()
}

/// Parse `NAME=COMMAND [ARGS...]` as given on the command line.
pub fn parse_step_spec(spec: &str) -> Result<Step, String> {
    let (name, rest) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=COMMAND, got '{spec}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("step name is empty in '{spec}'"));
    }
    let mut words = rest.split_whitespace();
    let command = words
        .next()
        .ok_or_else(|| format!("step '{name}' has no command"))?;
    Ok(Step::new(name, command, words))
}

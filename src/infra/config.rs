use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};
use crate::core::backup::BACKUP_SUFFIX;
use crate::core::validation::Step;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Suffix appended to a file name to locate its rollback copy
    pub backup_suffix: String,

    /// Validation runner settings
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig
{
    /// Time between SIGTERM and SIGKILL when a job is stopped
    pub grace_period_ms: u64,

    /// Remove ANSI escape sequences from streamed log lines
    pub strip_ansi: bool,

    /// Explicit steps; empty means detect from the project files
    pub steps: Vec<Step>,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self { backup_suffix: BACKUP_SUFFIX.to_string(), validation: ValidationConfig::default() }
    }
}

impl Default for ValidationConfig
{
    fn default() -> Self
    {
        Self { grace_period_ms: 2000, strip_ansi: true, steps: Vec::new() }
    }
}

/// Load configuration with config files looked up in `dir`, usually the
/// repository root.
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["devpilot.toml", "devpilot.yaml", "devpilot.json", ".devpilot.toml"];

    for name in &config_paths
    {
        let path = dir.join(name);
        if path.is_file()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    // Add environment variables with DEVPILOT_ prefix
    builder = builder.add_source(
        config::Environment::with_prefix("DEVPILOT")
            .prefix_separator("_")
            .separator("__"),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("devpilot.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        println!("{toml_string}");
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

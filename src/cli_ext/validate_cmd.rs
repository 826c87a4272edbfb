//! CLI handler for `validate`.
//!
//! Runs one validation job on a tokio runtime, prints its events as they
//! arrive, and turns Ctrl-C into a stop request for the job.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tracing::{info, warn};

use crate::cli::{AppContext, ValidateArgs};
use crate::core::error::CliError;
use crate::core::validation::{
    EventBus, EventSink, JobStatus, OutputStream, RunnerOptions, Step, ValidationEvent,
    ValidationRunner, detect_steps, parse_step_spec,
};
use crate::infra::config::{ValidationConfig, load_config_from};

impl From<&ValidationConfig> for RunnerOptions
{
    fn from(cfg: &ValidationConfig) -> Self
    {
        Self { grace_period: Duration::from_millis(cfg.grace_period_ms), strip_ansi: cfg.strip_ansi }
    }
}

/// Steps from `--step`, else from config, else detected from the directory.
fn resolve_steps(
    args: &ValidateArgs,
    cfg: &ValidationConfig,
) -> Result<Vec<Step>>
{
    if !args
        .steps
        .is_empty()
    {
        return args
            .steps
            .iter()
            .map(|s| parse_step_spec(s).map_err(|e| CliError::InvalidInput(e).into()))
            .collect();
    }
    if !cfg
        .steps
        .is_empty()
    {
        return Ok(cfg
            .steps
            .clone());
    }
    Ok(detect_steps(&args.dir))
}

pub fn run(
    args: ValidateArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let cfg = load_config_from(&args.dir)?;
    let steps = resolve_steps(&args, &cfg.validation)?;
    let dir = dunce::canonicalize(&args.dir)
        .map_err(|e| CliError::InvalidInput(format!("{}: {e}", args.dir.display())))?;

    if steps.is_empty() && !ctx.quiet
    {
        eprintln!("no validation steps configured or detected in {}", dir.display());
    }

    if ctx.dry_run
    {
        for (i, step) in steps
            .iter()
            .enumerate()
        {
            println!("{}. {}: {} {}", i + 1, step.name, step.command, step.args.join(" "));
        }
        return Ok(());
    }

    let job_id = args
        .job_id
        .clone()
        .unwrap_or_else(|| {
            uuid::Uuid::new_v4()
                .to_string()
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let status = runtime.block_on(run_job(
        job_id,
        dir,
        steps,
        RunnerOptions::from(&cfg.validation),
        args.json,
        ctx,
    ))?;

    match status
    {
        JobStatus::Passed => Ok(()),
        other => Err(CliError::Validation(format!("job {other}")).into()),
    }
}

async fn run_job(
    job_id: String,
    dir: std::path::PathBuf,
    steps: Vec<Step>,
    options: RunnerOptions,
    json: bool,
    ctx: &AppContext,
) -> Result<JobStatus>
{
    let runner = Arc::new(ValidationRunner::new(options));
    let bus = Arc::new(EventBus::new());
    let mut events = bus.subscribe(&job_id);

    let sink: Arc<dyn EventSink> = bus.clone();
    let handle = runner.start(&job_id, dir, steps, sink)?;

    // Ctrl-C asks the runner to stop; the job still finishes with `end`
    let interrupt = {
        let runner = Arc::clone(&runner);
        let job_id = job_id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c()
                .await
                .is_ok()
            {
                warn!(%job_id, "interrupt received, stopping job");
                runner
                    .stop(&job_id)
                    .await;
            }
        })
    };

    while let Some(event) = events
        .recv()
        .await
    {
        if json
        {
            println!("{}", serde_json::to_string(&event)?);
        }
        else
        {
            print_event(&event, ctx);
        }
    }

    let status = handle
        .await
        .context("validation task panicked")?;
    interrupt.abort();
    info!(%job_id, %status, "validation finished");
    Ok(status)
}

fn print_event(
    event: &ValidationEvent,
    ctx: &AppContext,
)
{
    let color = !ctx.no_color;
    match event
    {
        ValidationEvent::Start { job_id } =>
        {
            if !ctx.quiet
            {
                println!("validation job {job_id}");
            }
        }
        ValidationEvent::StepStart { step, .. } =>
        {
            if !ctx.quiet
            {
                let label = format!("==> {step}");
                if color
                {
                    println!("{}", label.bold());
                }
                else
                {
                    println!("{label}");
                }
            }
        }
        ValidationEvent::Log { stream, line, .. } => match stream
        {
            OutputStream::Stdout => println!("{line}"),
            OutputStream::Stderr => eprintln!("{line}"),
        },
        ValidationEvent::StepEnd { step, ok, exit_code } =>
        {
            let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            let (mark, text) = if *ok { ("✓", "ok") } else { ("✗", "failed") };
            let line = format!("{mark} {step} {text} (exit {code})");
            if color && *ok
            {
                println!("{}", line.green());
            }
            else if color
            {
                println!("{}", line.red());
            }
            else
            {
                println!("{line}");
            }
        }
        ValidationEvent::Error { message } => eprintln!("error: {message}"),
        ValidationEvent::End { status, .. } =>
        {
            if !ctx.quiet
            {
                println!("job {status}");
            }
        }
    }
}

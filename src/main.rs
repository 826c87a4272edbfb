use clap::Parser;
use devpilot::cli::{AppContext, Cli, Commands};
use devpilot::core::error::finish_with_exit;
use tracing_subscriber::EnvFilter;

fn init_tracing(ctx: &AppContext) {
    // DEVPILOT_LOG takes precedence over --verbose
    let filter = EnvFilter::try_from_env("DEVPILOT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if ctx.verbose { "devpilot=debug" } else { "warn" })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!ctx.no_color)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = cli.context();
    init_tracing(&ctx);

    let result = match cli.command {
        Commands::Plan(args) => devpilot::cli_ext::patch_cmd::plan_run(args, &ctx),
        Commands::Apply(args) => devpilot::cli_ext::patch_cmd::apply_run(args, &ctx),
        Commands::Merge(args) => devpilot::cli_ext::patch_cmd::merge_run(args, &ctx),
        Commands::Rollback(args) => devpilot::cli_ext::patch_cmd::rollback_run(args, &ctx),
        Commands::Validate(args) => devpilot::cli_ext::validate_cmd::run(args, &ctx),
        Commands::Init(args) => devpilot::infra::config::init(args, &ctx),
        Commands::Completions(args) => devpilot::completion::run(args, &ctx),
    };

    finish_with_exit(result);
}

use anyhow::Result;
use clap::Parser;
use desync::cli::{AppContext, Cli, Commands};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Logging goes to stderr so stdout stays clean for reports.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Generate(args) => {
            let report = desync::core::generate::run(args, &ctx)?;
            // Non-zero exit whenever a committed file was (or would be)
            // replaced, so CI can detect a stale sync tree.
            if !report.changed.is_empty() {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Init(args) => desync::infra::config::init(args, &ctx),
        Commands::Completions(args) => desync::completion::run(args),
    }
}

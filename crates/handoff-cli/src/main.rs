//! `handoff` -- CLI binary for the handoff support orchestrator.
//!
//! Subcommands:
//!
//! - `handoff serve` -- run the orchestrator with a console ingress;
//!   drains cleanly on ctrl-c or EOF.
//! - `handoff status` -- show resolved configuration and roster
//!   diagnostics.
//! - `handoff check-config` -- validate a config file; this is the
//!   reload-config gate, exit code 2 on validation failure.
//!
//! Exit codes: 0 on clean exit/drain, 1 on abort, 2 on config
//! validation failure.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config_file;
mod watch;

/// handoff support orchestrator CLI.
#[derive(Parser)]
#[command(name = "handoff", about = "Human-in-the-loop support orchestrator", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (TOML). Defaults apply when absent.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator with a console ingress.
    Serve(commands::serve::ServeArgs),

    /// Show resolved configuration and roster diagnostics.
    Status,

    /// Validate a config file (the reload-config gate).
    CheckConfig,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Serve(args) => commands::serve::run(cli.config.as_deref(), args).await,
        Commands::Status => commands::status::run(cli.config.as_deref()),
        Commands::CheckConfig => commands::check_config::run(cli.config.as_deref()),
    };
    std::process::exit(code);
}

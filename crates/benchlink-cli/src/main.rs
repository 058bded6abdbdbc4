use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::{CheckArgs, ServeArgs};

/// Benchlink CLI - MCP bridge for laboratory notebook kernels
#[derive(Parser)]
#[command(
    name = "benchlink",
    version,
    about = "MCP bridge for laboratory notebook kernels",
    long_about = "Connects desktop AI assistants to a laboratory notebook kernel service: \
                  serves the Model Context Protocol on stdio and forwards tool and resource \
                  calls to the kernel over session-based HTTP."
)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the bridge on stdio for an MCP host
    Serve(ServeArgs),

    /// Probe the kernel service once and report readiness
    Check(CheckArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match cli.command {
        Commands::Serve(args) => commands::serve::execute(args).await,
        Commands::Check(args) => commands::check::execute(args).await,
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    // stdout carries the MCP stream; all diagnostics go to stderr.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

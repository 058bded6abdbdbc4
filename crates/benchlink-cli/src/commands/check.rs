//! `benchlink check` - one-shot kernel readiness probe.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use benchlink_bridge::is_backend_ready;

#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    /// Kernel service host
    #[arg(long, env = "BENCHLINK_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Kernel service port
    #[arg(long, env = "BENCHLINK_PORT", default_value_t = 8123)]
    pub port: u16,

    /// Probe timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout_secs: u64,
}

pub async fn execute(args: CheckArgs) -> Result<()> {
    let timeout = Duration::from_secs(args.timeout_secs);

    if is_backend_ready(&args.host, args.port, timeout).await {
        println!(
            "{} kernel service at {}:{} is ready",
            "✓".green().bold(),
            args.host,
            args.port
        );
        Ok(())
    } else {
        println!(
            "{} kernel service at {}:{} is not ready",
            "✗".red().bold(),
            args.host,
            args.port
        );
        std::process::exit(1);
    }
}

//! `benchlink serve` - run the bridge on stdio.

use std::time::Duration;

use anyhow::Result;
use clap::{Args, ValueEnum};

use benchlink_bridge::{BridgeBuilder, UnreadyPolicy};

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Base URL of the kernel service
    #[arg(long, env = "BENCHLINK_BASE_URL", default_value = "http://127.0.0.1:8123")]
    pub base_url: String,

    /// What to do when the kernel fails the startup readiness probe
    #[arg(long, value_enum, default_value_t = PolicyArg::Degrade)]
    pub on_unready: PolicyArg,

    /// Bearer token forwarded to the kernel on every request
    #[arg(long, env = "BENCHLINK_TRUST_TOKEN")]
    pub trust_token: Option<String>,

    /// Steady-state request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Readiness probe timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub probe_timeout_secs: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    /// Refuse to start when the kernel is not ready
    Fail,
    /// Start anyway; calls surface errors until the kernel appears
    Degrade,
}

impl From<PolicyArg> for UnreadyPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::Fail => UnreadyPolicy::Fail,
            PolicyArg::Degrade => UnreadyPolicy::Degrade,
        }
    }
}

pub async fn execute(args: ServeArgs) -> Result<()> {
    let mut builder = BridgeBuilder::new()
        .base_url(&args.base_url)
        .request_timeout(Duration::from_secs(args.timeout_secs))
        .probe_timeout(Duration::from_secs(args.probe_timeout_secs))
        .on_unready(args.on_unready.into());

    if let Some(token) = args.trust_token {
        builder = builder.trust_token(token);
    }

    builder.build()?.start().await
}

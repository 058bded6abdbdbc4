//! # Benchlink Bridge
//!
//! MCP-to-kernel bridge for the Benchlink toolkit: exposes a long-running
//! laboratory notebook kernel service to Model Context Protocol clients such
//! as desktop AI assistants.
//!
//! ## Features
//!
//! - **RMCP protocol support**: MCP served over stdio using the rmcp crate
//! - **Session-based HTTP transport**: JSON-RPC toward the kernel with
//!   `mcp-session-id` correlation and automatic handshake
//! - **Dual-mode decoding**: bare JSON and SSE-framed responses handled
//!   identically on every response path
//! - **Failure-as-value contract**: a dead kernel produces `{"error": …}`
//!   payloads upstream, never a crashed bridge
//! - **Static catalog**: fixed instrument, notebook, sweep, database and
//!   dynamic-tool surfaces forwarded verbatim to the kernel
//!
//! ## Quick Start
//!
//! ```no_run
//! use benchlink_bridge::start_bridge;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Serve MCP on stdio, backed by the kernel at this URL.
//!     start_bridge("http://127.0.0.1:8123").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Advanced Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use benchlink_bridge::{BridgeBuilder, UnreadyPolicy};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bridge = BridgeBuilder::new()
//!         .base_url("http://127.0.0.1:8123")
//!         .request_timeout(Duration::from_secs(60))
//!         .on_unready(UnreadyPolicy::Fail)
//!         .build()?;
//!
//!     bridge.start().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod kernel_client;
pub mod protocol;
pub mod readiness;
pub mod rmcp_server;

// Re-export main types for convenience
pub use builder::{Bridge, BridgeBuilder, BridgeConfig, UnreadyPolicy};
pub use kernel_client::{KernelClient, KernelError, DEFAULT_SESSION};
pub use readiness::is_backend_ready;
pub use rmcp_server::KernelBridge;

use anyhow::Result;

/// Start a bridge for the kernel at `base_url` using default settings.
///
/// Equivalent to building with [`BridgeBuilder::new`] defaults: 30 s request
/// timeout, 5 s probe timeout, degrade when the kernel is not ready.
pub async fn start_bridge(base_url: &str) -> Result<()> {
    BridgeBuilder::new().base_url(base_url).build()?.start().await
}

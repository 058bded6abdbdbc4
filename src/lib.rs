//! # Benchlink
//!
//! Connect desktop AI assistants to laboratory automation: benchlink bridges
//! the Model Context Protocol (served on stdio toward the AI host) to a
//! long-running computational-notebook kernel service reached over
//! session-based HTTP with optional SSE framing.
//!
//! This facade crate re-exports the bridge; install the `benchlink` binary
//! from `benchlink-cli` to run it from an MCP host configuration.
//!
//! ## Quick Start
//!
//! ```no_run
//! use benchlink::start_bridge;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     start_bridge("http://127.0.0.1:8123").await?;
//!     Ok(())
//! }
//! ```

// Re-export the bridge implementation
pub use benchlink_bridge as bridge;

// Re-export commonly used items
pub use benchlink_bridge::{
    is_backend_ready, start_bridge, Bridge, BridgeBuilder, BridgeConfig, KernelBridge,
    KernelClient, KernelError, UnreadyPolicy, DEFAULT_SESSION,
};

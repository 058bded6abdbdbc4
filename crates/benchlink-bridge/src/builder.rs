//! Builder pattern for creating and configuring kernel bridges.

use std::time::Duration;

use anyhow::Result;

/// What `Bridge::start` does when the kernel fails the readiness probe.
///
/// An explicit configuration choice rather than an accident of which code
/// path happens to run: `Fail` refuses to serve, `Degrade` serves anyway and
/// lets every call surface an `{"error": …}` payload until the kernel
/// appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnreadyPolicy {
    /// Refuse to start when the backend is not ready.
    Fail,
    /// Start anyway; calls degrade to error payloads.
    #[default]
    Degrade,
}

/// Resolved bridge configuration, produced by [`BridgeBuilder::build`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub probe_timeout: Duration,
    pub trust_token: Option<String>,
    pub on_unready: UnreadyPolicy,
}

/// Builder for bridge configurations.
///
/// # Example
///
/// ```no_run
/// use benchlink_bridge::BridgeBuilder;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let bridge = BridgeBuilder::new()
///         .base_url("http://127.0.0.1:8123")
///         .build()?;
///
///     bridge.start().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BridgeBuilder {
    base_url: Option<String>,
    request_timeout: Duration,
    probe_timeout: Duration,
    trust_token: Option<String>,
    on_unready: UnreadyPolicy,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeBuilder {
    /// Create a builder with default settings: 30 s request timeout, 5 s
    /// probe timeout, degrade on an unready backend.
    pub fn new() -> Self {
        Self {
            base_url: None,
            request_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            trust_token: None,
            on_unready: UnreadyPolicy::default(),
        }
    }

    /// Set the kernel service base URL, e.g. `http://127.0.0.1:8123`.
    pub fn base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Convenience for plain-HTTP kernels addressed by host and port.
    pub fn host_port(self, host: &str, port: u16) -> Self {
        self.base_url(format!("http://{host}:{port}"))
    }

    /// Timeout for steady-state kernel calls.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Timeout for the startup readiness probe.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Bearer token forwarded to the kernel on every request.
    pub fn trust_token<S: Into<String>>(mut self, token: S) -> Self {
        self.trust_token = Some(token.into());
        self
    }

    /// Policy for a backend that fails the startup readiness probe.
    pub fn on_unready(mut self, policy: UnreadyPolicy) -> Self {
        self.on_unready = policy;
        self
    }

    /// Validate the configuration and produce a [`Bridge`] ready to start.
    pub fn build(self) -> Result<Bridge> {
        let base_url = self
            .base_url
            .ok_or_else(|| anyhow::anyhow!("kernel base URL is required"))?;

        let parsed = url::Url::parse(&base_url)
            .map_err(|e| anyhow::anyhow!("invalid base URL '{base_url}': {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("unsupported base URL scheme '{}'", parsed.scheme());
        }
        if parsed.host_str().is_none() {
            anyhow::bail!("base URL '{base_url}' has no host");
        }

        Ok(Bridge {
            config: BridgeConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                request_timeout: self.request_timeout,
                probe_timeout: self.probe_timeout,
                trust_token: self.trust_token,
                on_unready: self.on_unready,
            },
        })
    }
}

/// A configured bridge ready to serve MCP over stdio.
#[derive(Debug, Clone)]
pub struct Bridge {
    config: BridgeConfig,
}

impl Bridge {
    /// Run the readiness probe, apply the unready policy, then serve the
    /// catalog over stdio until the host disconnects.
    pub async fn start(self) -> Result<()> {
        crate::rmcp_server::run(self.config).await
    }

    /// The kernel base URL this bridge is configured for.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// The configured unready-backend policy.
    pub fn unready_policy(&self) -> UnreadyPolicy {
        self.config.on_unready
    }
}

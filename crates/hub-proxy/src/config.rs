//! Configuration for the hub proxy
//!
//! Supports loading from JSON/YAML files or programmatic construction.

use anyhow::{Context, Result};
use hub_core::validate_server_name;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main configuration for the proxy
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxyConfig {
    /// Downstream servers to aggregate
    #[serde(default)]
    pub servers: Vec<ServerDescriptor>,

    /// Health probing settings
    #[serde(default)]
    pub health: HealthConfig,

    /// Discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Toolset resolution policy
    #[serde(default)]
    pub toolsets: ToolsetPolicy,

    /// Endpoint this proxy is reachable at, used to filter server entries
    /// that would point the proxy back at itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertised_endpoint: Option<String>,
}

impl ProxyConfig {
    /// Load configuration from a JSON or YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = if path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false)
        {
            serde_yaml::from_str(&content).with_context(|| "Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).with_context(|| "Failed to parse JSON config")?
        };

        config.validate()?;
        info!("Loaded proxy config from {}", path.display());
        Ok(config)
    }

    /// Load from default paths, with fallbacks
    pub fn load_default() -> Result<Self> {
        let paths = ["/etc/mcp-hub/hub.json", "/etc/mcp-hub/hub.yaml", "hub.json"];

        for path in paths {
            if Path::new(path).exists() {
                return Self::load(path);
            }
        }

        info!("No proxy config found, using defaults");
        Ok(Self::default())
    }

    /// Create a builder for programmatic configuration
    pub fn builder() -> ProxyConfigBuilder {
        ProxyConfigBuilder::default()
    }

    /// Reject configurations the pool cannot safely own
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            validate_server_name(&server.name)
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            if !seen.insert(server.name.as_str()) {
                anyhow::bail!("Duplicate server name in config: {}", server.name);
            }
            server.validate()?;
        }
        Ok(())
    }

    /// Enabled servers only, highest priority first
    pub fn enabled_servers(&self) -> Vec<&ServerDescriptor> {
        let mut servers: Vec<&ServerDescriptor> =
            self.servers.iter().filter(|s| s.enabled).collect();
        servers.sort_by(|a, b| b.priority.cmp(&a.priority));
        servers
    }
}

/// Builder for ProxyConfig
#[derive(Default)]
pub struct ProxyConfigBuilder {
    config: ProxyConfig,
}

impl ProxyConfigBuilder {
    pub fn server(mut self, server: ServerDescriptor) -> Self {
        self.config.servers.push(server);
        self
    }

    pub fn health(mut self, health: HealthConfig) -> Self {
        self.config.health = health;
        self
    }

    pub fn allow_stale_refs(mut self, allow: bool) -> Self {
        self.config.toolsets.allow_stale_refs = allow;
        self
    }

    pub fn advertised_endpoint(mut self, endpoint: &str) -> Self {
        self.config.advertised_endpoint = Some(endpoint.to_string());
        self
    }

    pub fn build(self) -> ProxyConfig {
        self.config
    }
}

/// Configuration for one downstream server
///
/// Immutable per session once handed to the pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique name; becomes the namespace prefix of every tool it exposes
    pub name: String,

    /// Transport kind
    #[serde(default)]
    pub transport: TransportKind,

    /// Command to spawn (stdio transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for the spawned command
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables for the spawned command
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Endpoint URL (http/sse transports)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Extra request headers (http/sse transports)
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Bundle directory (extension transport)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<PathBuf>,

    /// Optional authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ServerAuth>,

    /// Whether this server participates in the pool
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Higher priority servers are connected first
    #[serde(default)]
    pub priority: i32,

    /// Per-operation timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

impl ServerDescriptor {
    /// Create a stdio-based server descriptor
    pub fn stdio(name: &str, command: &str, args: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            transport: TransportKind::Stdio,
            command: Some(command.to_string()),
            args,
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            bundle: None,
            auth: None,
            enabled: true,
            priority: 0,
            timeout_secs: default_timeout(),
        }
    }

    /// Create an HTTP-based server descriptor
    pub fn http(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            transport: TransportKind::Http,
            command: None,
            args: vec![],
            env: HashMap::new(),
            url: Some(url.to_string()),
            headers: HashMap::new(),
            bundle: None,
            auth: None,
            enabled: true,
            priority: 0,
            timeout_secs: default_timeout(),
        }
    }

    /// Create an SSE-based server descriptor
    pub fn sse(name: &str, url: &str) -> Self {
        let mut descriptor = Self::http(name, url);
        descriptor.transport = TransportKind::Sse;
        descriptor
    }

    /// Create a packaged-extension server descriptor
    pub fn extension(name: &str, bundle: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            transport: TransportKind::Extension,
            command: None,
            args: vec![],
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            bundle: Some(bundle.into()),
            auth: None,
            enabled: true,
            priority: 0,
            timeout_secs: default_timeout(),
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_auth(mut self, auth: ServerAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the transport-specific required fields
    pub fn validate(&self) -> Result<()> {
        match self.transport {
            TransportKind::Stdio => {
                if self.command.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    anyhow::bail!("Server '{}' uses stdio transport but has no command", self.name);
                }
            }
            TransportKind::Http | TransportKind::Sse => {
                if self.url.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    anyhow::bail!("Server '{}' uses {:?} transport but has no url", self.name, self.transport);
                }
            }
            TransportKind::Extension => {
                if self.bundle.is_none() {
                    anyhow::bail!("Server '{}' uses extension transport but has no bundle path", self.name);
                }
            }
        }
        Ok(())
    }
}

/// Transport kind for downstream servers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Spawned local process speaking line-delimited JSON-RPC
    #[default]
    Stdio,
    /// Single-endpoint HTTP JSON-RPC
    Http,
    /// HTTP + Server-Sent Events (legacy message endpoint)
    Sse,
    /// Packaged extension bundle resolved to a spawned process
    Extension,
}

/// Authentication configuration for downstream servers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerAuth {
    /// Bearer token authentication
    Bearer {
        /// Token value (can be an env var reference like ${GITHUB_TOKEN})
        token: String,
    },
    /// Basic authentication
    Basic { username: String, password: String },
    /// Custom header
    Header { name: String, value: String },
}

impl ServerAuth {
    /// Resolve environment variable references in auth values
    pub fn resolve(&self) -> Self {
        match self {
            Self::Bearer { token } => Self::Bearer {
                token: resolve_env_var(token),
            },
            Self::Basic { username, password } => Self::Basic {
                username: resolve_env_var(username),
                password: resolve_env_var(password),
            },
            Self::Header { name, value } => Self::Header {
                name: name.clone(),
                value: resolve_env_var(value),
            },
        }
    }
}

/// Resolve environment variable references like ${VAR_NAME}
fn resolve_env_var(value: &str) -> String {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

/// Health probing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Seconds between probes of each connected server
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    /// Consecutive failures before a server is marked unhealthy
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Deadline for a single probe
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,
}

fn default_health_interval() -> u64 {
    30
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_ping_timeout() -> u64 {
    10
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            failure_threshold: default_failure_threshold(),
            ping_timeout_secs: default_ping_timeout(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Deadline for one server's tools/list call
    #[serde(default = "default_discovery_timeout")]
    pub call_timeout_secs: u64,

    /// Seconds between background discovery cycles; absent disables the
    /// background refresh and discovery runs only on demand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval_secs: Option<u64>,
}

fn default_discovery_timeout() -> u64 {
    30
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_discovery_timeout(),
            refresh_interval_secs: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs.map(Duration::from_secs)
    }
}

/// Reference-resolution policy for saved toolsets
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsetPolicy {
    /// Treat a hash mismatch between a saved reference and the live tool as
    /// a warning instead of an error. Off by default; opting in weakens the
    /// stale-reference integrity check.
    #[serde(default)]
    pub allow_stale_refs: bool,
}

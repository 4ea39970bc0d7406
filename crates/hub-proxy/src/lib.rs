//! hub-proxy: the multi-server connection, discovery and composition engine
//!
//! Sits between one AI client and any number of independently managed tool
//! servers, presenting them as a single namespaced tool surface. One
//! downstream server going slow, crashing, or changing its schema degrades
//! that server alone; the proxy keeps serving the rest.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          hub-proxy                            │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │  ToolRouter: configuration / operational mode,          │  │
//! │  │  meta-tool dispatch, downstream call routing            │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! │                │                          │                   │
//! │  ┌──────────────────────────┐  ┌────────────────────────────┐ │
//! │  │ ToolsetEngine (regular)  │  │ PersonaDelegate (bundles)  │ │
//! │  │ build/equip/delete over  │  │ activate/deactivate with   │ │
//! │  │ persisted documents      │  │ state capture & restore    │ │
//! │  └──────────────────────────┘  └────────────────────────────┘ │
//! │                │                                              │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │  DiscoveryEngine: per-server snapshots, content hashes, │  │
//! │  │  added/updated/removed/unchanged diffing, resolution    │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! │        │                     │                                │
//! │  ┌──────────────┐  ┌──────────────────────────────────────┐   │
//! │  │ HealthMonitor│  │ ConnectionPool                       │   │
//! │  │ probe loops, │  │  ┌───────┐ ┌──────┐ ┌─────┐ ┌──────┐ │   │
//! │  │ streaks      │  │  │ stdio │ │ http │ │ sse │ │ ext. │ │   │
//! │  └──────────────┘  │  └───────┘ └──────┘ └─────┘ └──────┘ │   │
//! │                    └──────────────────────────────────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hub_proxy::{HubProxy, ProxyConfig};
//! use hub_state_store::SqliteStore;
//! use std::sync::Arc;
//!
//! let config = ProxyConfig::load("/etc/mcp-hub/hub.json")?;
//! let store = Arc::new(SqliteStore::new("sqlite:///var/lib/mcp-hub/hub.db").await?);
//! let proxy = HubProxy::new(config, store).await?;
//! proxy.initialize().await?;
//!
//! // The outer listener serves these two calls to the client
//! let tools = proxy.list_tools().await?;
//! let result = proxy.call_tool("git.status", serde_json::json!({})).await?;
//! ```

pub mod config;
pub mod discovery;
pub mod hash;
pub mod health;
pub mod pool;
pub mod proxy;
pub mod router;
pub mod toolset;
pub mod transport;

// Re-exports
pub use config::{ProxyConfig, ServerAuth, ServerDescriptor, TransportKind};
pub use discovery::{
    ChangeKind, ChangeSummary, DiscoveredTool, DiscoveryEngine, DiscoveryReport, ResolvedTool,
    ToolsChangedEvent,
};
pub use health::{HealthEvent, HealthMonitor, HealthState};
pub use pool::{ConnectionPool, ConnectionState, ConnectionStatus};
pub use proxy::{HubProxy, ProxyStatus, ServerStatus};
pub use router::{ModeChangedEvent, OperatingMode, ToolRouter};
pub use toolset::{
    BuildOptions, DelegateType, PersonaBundle, PersonaDelegate, ToolsetChange,
    ToolsetChangedEvent, ToolsetDelegate, ToolsetEngine, ToolsetSummary,
};
pub use transport::{build_transport, TransportClient};

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        HubProxy, OperatingMode, ProxyConfig, ServerDescriptor, ToolsetDelegate, TransportClient,
        TransportKind,
    };
    pub use hub_core::{HubError, Result, ToolDescriptor, ToolReference, ToolsetConfig};
}

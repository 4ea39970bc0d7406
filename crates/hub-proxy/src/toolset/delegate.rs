//! Common contract over the two toolset sources

use crate::discovery::DiscoveredTool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub_core::Result;

/// Which implementation is answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateType {
    Regular,
    Persona,
}

/// Listing entry for one toolset
#[derive(Debug, Clone)]
pub struct ToolsetSummary {
    pub name: String,
    pub description: Option<String>,
    pub tool_count: usize,
    pub created_at: Option<DateTime<Utc>>,
}

/// Result of an unequip call; idempotent callers check `was_active`
#[derive(Debug, Clone, Copy)]
pub struct UnequipOutcome {
    pub was_active: bool,
}

/// Uniform surface the router programs against.
///
/// The active implementation is chosen by asking the persona delegate
/// whether it has an active persona, never by inspecting concrete types.
#[async_trait]
pub trait ToolsetDelegate: Send + Sync {
    fn delegate_type(&self) -> DelegateType;

    async fn list_toolsets(&self) -> Result<Vec<ToolsetSummary>>;

    /// Activate a toolset by name, all-or-nothing
    async fn equip(&self, name: &str) -> Result<()>;

    /// Clear the active toolset; success even when nothing was active
    async fn unequip(&self) -> Result<UnequipOutcome>;

    async fn active_toolset(&self) -> Option<String>;

    async fn has_active(&self) -> bool;

    /// The resolved tools of the active toolset, per the live catalog
    async fn active_tools(&self) -> Result<Vec<DiscoveredTool>>;
}

//! Toolset composition: named, persisted subsets of the aggregate catalog
//!
//! Two sources of toolsets exist: the regular composition engine backed by
//! the document store, and the persona delegate backed by declarative
//! bundles. Both implement [`ToolsetDelegate`], so routing treats them
//! uniformly.

pub mod delegate;
pub mod engine;
pub mod persona;

use chrono::{DateTime, Utc};

pub use delegate::{DelegateType, ToolsetDelegate, ToolsetSummary, UnequipOutcome};
pub use engine::{BuildOptions, ToolsetEngine};
pub use persona::{DeactivationOutcome, PersonaActivation, PersonaBundle, PersonaDelegate};

/// What happened to the active toolset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolsetChange {
    /// A toolset became active
    Activated,
    /// Discovery touched tools referenced by the active toolset
    Updated,
    /// The active toolset was cleared
    Cleared,
    /// A persisted toolset document was deleted
    Deleted,
}

/// Emitted by the composition engine and the persona delegate
#[derive(Debug, Clone)]
pub struct ToolsetChangedEvent {
    pub change: ToolsetChange,
    pub toolset: String,
    pub timestamp: DateTime<Utc>,
}

impl ToolsetChangedEvent {
    pub(crate) fn now(change: ToolsetChange, toolset: impl Into<String>) -> Self {
        Self {
            change,
            toolset: toolset.into(),
            timestamp: Utc::now(),
        }
    }
}

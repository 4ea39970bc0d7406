//! Document store contract for toolsets and persona runtime state

use crate::error::Result;
use async_trait::async_trait;
use hub_core::{PersonaRuntimeState, ToolsetConfig};

/// Key-value document store consumed by the toolset composition engine.
///
/// Toolset documents are saved and replaced whole; partial updates are not
/// part of the contract. Persona runtime state is a single record that
/// exists only while a persona is active.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Save or replace a toolset document, keyed by its name
    async fn save_toolset(&self, config: &ToolsetConfig) -> Result<()>;

    /// Load a toolset document by name
    async fn get_toolset(&self, name: &str) -> Result<Option<ToolsetConfig>>;

    /// Delete a toolset document; returns whether it existed
    async fn delete_toolset(&self, name: &str) -> Result<bool>;

    /// Load every persisted toolset document
    async fn list_toolsets(&self) -> Result<Vec<ToolsetConfig>>;

    /// Check whether a toolset document exists
    async fn toolset_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_toolset(name).await?.is_some())
    }

    /// Save or replace the persona runtime record
    async fn save_persona_state(&self, state: &PersonaRuntimeState) -> Result<()>;

    /// Load the persona runtime record, if one is present
    async fn load_persona_state(&self) -> Result<Option<PersonaRuntimeState>>;

    /// Remove the persona runtime record
    async fn clear_persona_state(&self) -> Result<()>;
}

//! In-memory store for unit tests and ephemeral deployments

use crate::error::Result;
use crate::store::StateStore;
use async_trait::async_trait;
use hub_core::{PersonaRuntimeState, ToolsetConfig};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// HashMap-backed store with the same contract as [`SqliteStore`](crate::SqliteStore)
#[derive(Default)]
pub struct MemoryStore {
    toolsets: RwLock<HashMap<String, ToolsetConfig>>,
    persona: RwLock<Option<PersonaRuntimeState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn save_toolset(&self, config: &ToolsetConfig) -> Result<()> {
        self.toolsets
            .write()
            .await
            .insert(config.name.clone(), config.clone());
        Ok(())
    }

    async fn get_toolset(&self, name: &str) -> Result<Option<ToolsetConfig>> {
        Ok(self.toolsets.read().await.get(name).cloned())
    }

    async fn delete_toolset(&self, name: &str) -> Result<bool> {
        Ok(self.toolsets.write().await.remove(name).is_some())
    }

    async fn list_toolsets(&self) -> Result<Vec<ToolsetConfig>> {
        let mut all: Vec<ToolsetConfig> = self.toolsets.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn save_persona_state(&self, state: &PersonaRuntimeState) -> Result<()> {
        *self.persona.write().await = Some(state.clone());
        Ok(())
    }

    async fn load_persona_state(&self) -> Result<Option<PersonaRuntimeState>> {
        Ok(self.persona.read().await.clone())
    }

    async fn clear_persona_state(&self) -> Result<()> {
        *self.persona.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::ToolReference;

    #[tokio::test]
    async fn test_memory_store_matches_contract() {
        let store = MemoryStore::new();
        let toolset = ToolsetConfig::new("dev", None, vec![ToolReference::new("git.status")]);

        store.save_toolset(&toolset).await.unwrap();
        assert!(store.toolset_exists("dev").await.unwrap());
        assert_eq!(store.list_toolsets().await.unwrap().len(), 1);
        assert!(store.delete_toolset("dev").await.unwrap());
        assert!(store.get_toolset("dev").await.unwrap().is_none());
    }
}

//! Toolset composition engine
//!
//! Owns the single active toolset and the persisted toolset documents.
//! Mutations (build/equip/unequip/delete) run under one non-reentrant
//! mutex and are processed strictly in the order received.

use crate::discovery::{ChangeKind, DiscoveredTool, DiscoveryEngine, ToolsChangedEvent};
use crate::toolset::delegate::{DelegateType, ToolsetDelegate, ToolsetSummary, UnequipOutcome};
use crate::toolset::{ToolsetChange, ToolsetChangedEvent};
use async_trait::async_trait;
use hub_core::{validate_toolset_name, HubError, Result, ToolReference, ToolsetConfig};
use hub_state_store::StateStore;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Options for [`ToolsetEngine::build`]
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub description: Option<String>,
    /// Equip the toolset immediately after a successful build
    pub auto_equip: bool,
    /// Replace an existing document instead of rejecting the name
    pub overwrite: bool,
}

/// Store-backed toolset manager; the regular [`ToolsetDelegate`]
pub struct ToolsetEngine {
    store: Arc<dyn StateStore>,
    discovery: Arc<DiscoveryEngine>,
    allow_stale_refs: bool,
    active: RwLock<Option<ToolsetConfig>>,
    mutation: Mutex<()>,
    events: broadcast::Sender<ToolsetChangedEvent>,
}

impl ToolsetEngine {
    pub fn new(
        store: Arc<dyn StateStore>,
        discovery: Arc<DiscoveryEngine>,
        allow_stale_refs: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            discovery,
            allow_stale_refs,
            active: RwLock::new(None),
            mutation: Mutex::new(()),
            events,
        }
    }

    /// Subscribe to toolset change events
    pub fn subscribe(&self) -> broadcast::Receiver<ToolsetChangedEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<ToolsetChangedEvent> {
        self.events.clone()
    }

    fn emit(&self, change: ToolsetChange, toolset: &str) {
        let _ = self.events.send(ToolsetChangedEvent::now(change, toolset));
    }

    /// Validate and persist a toolset document.
    ///
    /// Every reference must resolve against the live catalog under the
    /// configured policy; a single unresolvable reference fails the build
    /// and nothing is persisted.
    pub async fn build(
        &self,
        name: &str,
        refs: Vec<ToolReference>,
        options: BuildOptions,
    ) -> Result<ToolsetConfig> {
        let _guard = self.mutation.lock().await;

        validate_toolset_name(name)?;

        let existing = self.store.get_toolset(name).await.map_err(HubError::from)?;
        if existing.is_some() && !options.overwrite {
            return Err(HubError::validation(format!(
                "Toolset '{}' already exists; pass overwrite to replace it",
                name
            )));
        }

        let mut failures = Vec::new();
        for reference in &refs {
            if let Err(e) = self
                .discovery
                .resolve_reference(reference, self.allow_stale_refs)
                .await
            {
                failures.push(format!("{} ({})", reference.namespaced_name, e.kind()));
            }
        }
        if !failures.is_empty() {
            return Err(HubError::validation(format!(
                "Toolset '{}' references unresolvable tools: {}",
                name,
                failures.join(", ")
            )));
        }

        let mut config = ToolsetConfig::new(name, options.description, refs);
        if let Some(previous) = existing {
            config.version = previous.version + 1;
        }

        self.store.save_toolset(&config).await.map_err(HubError::from)?;
        info!(
            "Built toolset '{}' v{} with {} tools",
            name,
            config.version,
            config.tools.len()
        );

        if options.auto_equip {
            self.equip_inner(name).await?;
        }

        Ok(config)
    }

    /// Activate a persisted toolset, all-or-nothing.
    ///
    /// A failure (missing document, or a reference that no longer resolves
    /// under the policy) leaves whatever was active before untouched.
    pub async fn equip(&self, name: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;
        self.equip_inner(name).await
    }

    async fn equip_inner(&self, name: &str) -> Result<()> {
        let config = self
            .store
            .get_toolset(name)
            .await
            .map_err(HubError::from)?
            .ok_or_else(|| HubError::not_found(format!("Toolset '{}' does not exist", name)))?;

        for reference in &config.tools {
            self.discovery
                .resolve_reference(reference, self.allow_stale_refs)
                .await?;
        }

        *self.active.write().await = Some(config);
        info!("Equipped toolset: {}", name);
        self.emit(ToolsetChange::Activated, name);
        Ok(())
    }

    /// Clear the active toolset. Idempotent.
    pub async fn unequip(&self) -> Result<UnequipOutcome> {
        let _guard = self.mutation.lock().await;
        Ok(self.unequip_inner().await)
    }

    async fn unequip_inner(&self) -> UnequipOutcome {
        match self.active.write().await.take() {
            Some(config) => {
                info!("Unequipped toolset: {}", config.name);
                self.emit(ToolsetChange::Cleared, &config.name);
                UnequipOutcome { was_active: true }
            }
            None => UnequipOutcome { was_active: false },
        }
    }

    /// Delete a persisted toolset; unequips it first if it is active
    pub async fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;

        let removed = self.store.delete_toolset(name).await.map_err(HubError::from)?;
        if !removed {
            return Err(HubError::not_found(format!(
                "Toolset '{}' does not exist",
                name
            )));
        }

        let was_active = self
            .active
            .read()
            .await
            .as_ref()
            .map(|c| c.name == name)
            .unwrap_or(false);
        if was_active {
            self.unequip_inner().await;
        }

        info!("Deleted toolset: {}", name);
        self.emit(ToolsetChange::Deleted, name);
        Ok(())
    }

    /// Load one persisted toolset document
    pub async fn get_toolset(&self, name: &str) -> Result<Option<ToolsetConfig>> {
        self.store.get_toolset(name).await.map_err(HubError::from)
    }

    /// React to a discovery diff: surface staleness of the active toolset
    /// without deactivating it. Only an exact namespaced-name overlap with
    /// a non-`Unchanged` change produces an event.
    pub async fn handle_tools_changed(&self, event: &ToolsChangedEvent) {
        let active = self.active.read().await.clone();
        let Some(active) = active else { return };

        let touched = event
            .changes
            .iter()
            .filter(|c| c.kind != ChangeKind::Unchanged)
            .any(|c| active.references(&c.namespaced_name));

        if touched {
            debug!(
                "Discovery changed tools referenced by active toolset '{}'",
                active.name
            );
            self.emit(ToolsetChange::Updated, &active.name);
        }
    }
}

#[async_trait]
impl ToolsetDelegate for ToolsetEngine {
    fn delegate_type(&self) -> DelegateType {
        DelegateType::Regular
    }

    async fn list_toolsets(&self) -> Result<Vec<ToolsetSummary>> {
        let toolsets = self.store.list_toolsets().await.map_err(HubError::from)?;
        Ok(toolsets
            .into_iter()
            .map(|t| ToolsetSummary {
                name: t.name,
                description: t.description,
                tool_count: t.tools.len(),
                created_at: Some(t.created_at),
            })
            .collect())
    }

    async fn equip(&self, name: &str) -> Result<()> {
        ToolsetEngine::equip(self, name).await
    }

    async fn unequip(&self) -> Result<UnequipOutcome> {
        ToolsetEngine::unequip(self).await
    }

    async fn active_toolset(&self) -> Option<String> {
        self.active.read().await.as_ref().map(|c| c.name.clone())
    }

    async fn has_active(&self) -> bool {
        self.active.read().await.is_some()
    }

    /// Resolve the active toolset's references against the live catalog.
    /// A reference that no longer resolves under the policy is dropped from
    /// the listing with a warning; staleness decides usability at call time.
    async fn active_tools(&self) -> Result<Vec<DiscoveredTool>> {
        let active = self.active.read().await.clone();
        let Some(active) = active else {
            return Ok(Vec::new());
        };

        let mut tools = Vec::with_capacity(active.tools.len());
        for reference in &active.tools {
            match self
                .discovery
                .resolve_reference(reference, self.allow_stale_refs)
                .await
            {
                Ok(resolved) => tools.push(resolved.tool),
                Err(e) => warn!(
                    "Active toolset '{}' references unavailable tool '{}': {}",
                    active.name, reference.namespaced_name, e
                ),
            }
        }
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryConfig, HealthConfig, ServerDescriptor};
    use crate::discovery::ChangeSummary;
    use crate::discovery::ToolChange;
    use crate::health::HealthMonitor;
    use crate::pool::ConnectionPool;
    use crate::transport::testing::{scripted, tool};
    use hub_state_store::MemoryStore;

    struct Fixture {
        engine: ToolsetEngine,
    }

    async fn fixture_with_tools(allow_stale: bool) -> Fixture {
        let pool = Arc::new(ConnectionPool::new(None));
        let health = Arc::new(HealthMonitor::new(HealthConfig::default()));
        let discovery = Arc::new(DiscoveryEngine::new(
            pool.clone(),
            health,
            DiscoveryConfig::default(),
        ));

        let client = scripted();
        client
            .set_tools(vec![
                tool("status", "Show status"),
                tool("log", "Show log"),
            ])
            .await;
        pool.connect_with_client(ServerDescriptor::stdio("git", "mcp-git", vec![]), client)
            .await
            .unwrap();
        discovery.discover_all().await;

        let engine = ToolsetEngine::new(Arc::new(MemoryStore::new()), discovery, allow_stale);
        Fixture { engine }
    }

    fn refs(names: &[&str]) -> Vec<ToolReference> {
        names.iter().map(|n| ToolReference::new(*n)).collect()
    }

    #[tokio::test]
    async fn test_invalid_name_persists_nothing() {
        let fx = fixture_with_tools(false).await;

        let err = fx
            .engine
            .build("My Toolset", refs(&["git.status"]), BuildOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(fx.engine.list_toolsets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_ref_fails_build() {
        let fx = fixture_with_tools(false).await;

        let err = fx
            .engine
            .build("dev", refs(&["git.status", "git.missing"]), BuildOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("git.missing"));
        assert!(fx.engine.get_toolset("dev").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_requires_overwrite() {
        let fx = fixture_with_tools(false).await;
        fx.engine
            .build("dev", refs(&["git.status"]), BuildOptions::default())
            .await
            .unwrap();

        let err = fx
            .engine
            .build("dev", refs(&["git.log"]), BuildOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let replaced = fx
            .engine
            .build(
                "dev",
                refs(&["git.log"]),
                BuildOptions {
                    overwrite: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(replaced.version, 2);
    }

    #[tokio::test]
    async fn test_build_equip_round_trip() {
        let fx = fixture_with_tools(false).await;
        fx.engine
            .build("dev", refs(&["git.status", "git.log"]), BuildOptions::default())
            .await
            .unwrap();

        fx.engine.equip("dev").await.unwrap();
        assert_eq!(fx.engine.active_toolset().await.as_deref(), Some("dev"));

        let mut names: Vec<String> = fx
            .engine
            .active_tools()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.namespaced_name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["git.log", "git.status"]);
    }

    #[tokio::test]
    async fn test_auto_equip() {
        let fx = fixture_with_tools(false).await;
        fx.engine
            .build(
                "dev",
                refs(&["git.status"]),
                BuildOptions {
                    auto_equip: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(fx.engine.has_active().await);
    }

    #[tokio::test]
    async fn test_equip_failure_leaves_previous_active() {
        let fx = fixture_with_tools(false).await;
        fx.engine
            .build("good", refs(&["git.status"]), BuildOptions::default())
            .await
            .unwrap();
        fx.engine.equip("good").await.unwrap();

        // A toolset whose reference hash no longer matches cannot equip in
        // strict mode
        fx.engine
            .build(
                "pinned",
                vec![ToolReference::new("git.log")],
                BuildOptions::default(),
            )
            .await
            .unwrap();
        // Corrupt the stored hash by rebuilding the document directly
        let mut config = fx.engine.get_toolset("pinned").await.unwrap().unwrap();
        config.tools = vec![ToolReference::with_hash("git.log", "stale-hash")];
        fx.engine.store.save_toolset(&config).await.unwrap();

        let err = ToolsetDelegate::equip(&fx.engine, "pinned").await.unwrap_err();
        assert_eq!(err.kind(), "stale-reference");
        assert_eq!(fx.engine.active_toolset().await.as_deref(), Some("good"));

        let err = fx.engine.equip("ghost").await.unwrap_err();
        assert_eq!(err.kind(), "not-found");
        assert_eq!(fx.engine.active_toolset().await.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_unequip_is_idempotent() {
        let fx = fixture_with_tools(false).await;

        let outcome = fx.engine.unequip().await.unwrap();
        assert!(!outcome.was_active);

        fx.engine
            .build(
                "dev",
                refs(&["git.status"]),
                BuildOptions {
                    auto_equip: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(fx.engine.unequip().await.unwrap().was_active);
        assert!(!fx.engine.unequip().await.unwrap().was_active);
    }

    #[tokio::test]
    async fn test_delete_active_toolset_unequips() {
        let fx = fixture_with_tools(false).await;
        fx.engine
            .build(
                "dev",
                refs(&["git.status"]),
                BuildOptions {
                    auto_equip: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut events = fx.engine.subscribe();
        fx.engine.delete("dev").await.unwrap();

        assert!(!fx.engine.has_active().await);
        assert!(fx.engine.get_toolset("dev").await.unwrap().is_none());

        let kinds: Vec<ToolsetChange> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.change)
            .collect();
        assert!(kinds.contains(&ToolsetChange::Cleared));
        assert!(kinds.contains(&ToolsetChange::Deleted));
    }

    fn change(kind: ChangeKind, name: &str) -> ToolChange {
        ToolChange {
            kind,
            namespaced_name: name.to_string(),
            previous_hash: Some("old".into()),
            current_hash: Some("new".into()),
        }
    }

    fn tools_changed(server: &str, changes: Vec<ToolChange>) -> ToolsChangedEvent {
        ToolsChangedEvent {
            server: server.to_string(),
            changes,
            summary: ChangeSummary::default(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_reactive_invalidation_exact_match_only() {
        let fx = fixture_with_tools(false).await;
        fx.engine
            .build(
                "dev",
                refs(&["git.status"]),
                BuildOptions {
                    auto_equip: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let mut events = fx.engine.subscribe();

        // A change to an unreferenced tool must produce nothing
        fx.engine
            .handle_tools_changed(&tools_changed(
                "git",
                vec![change(ChangeKind::Updated, "git.log")],
            ))
            .await;
        assert!(events.try_recv().is_err());

        // An Unchanged entry for a referenced tool must also produce nothing
        fx.engine
            .handle_tools_changed(&tools_changed(
                "git",
                vec![change(ChangeKind::Unchanged, "git.status")],
            ))
            .await;
        assert!(events.try_recv().is_err());

        // A real change to a referenced tool surfaces as Updated, without
        // deactivating the toolset
        fx.engine
            .handle_tools_changed(&tools_changed(
                "git",
                vec![change(ChangeKind::Updated, "git.status")],
            ))
            .await;
        let event = events.try_recv().unwrap();
        assert_eq!(event.change, ToolsetChange::Updated);
        assert_eq!(event.toolset, "dev");
        assert!(fx.engine.has_active().await);
    }

    #[tokio::test]
    async fn test_lenient_engine_lists_stale_tools() {
        let fx = fixture_with_tools(true).await;
        fx.engine
            .build("dev", vec![ToolReference::with_hash("git.status", "stale")], BuildOptions::default())
            .await
            .unwrap();
        fx.engine.equip("dev").await.unwrap();

        let tools = fx.engine.active_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
    }
}

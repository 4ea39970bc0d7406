//! Mode and routing façade
//!
//! Two catalogs exist side by side: the operational catalog (the active
//! toolset's tools, or every discovered tool when nothing is equipped) and
//! the configuration catalog (toolset management operations). Exactly one
//! is advertised at a time; inbound calls are either handled here (meta
//! tools) or routed to the owning downstream connection.

use crate::discovery::DiscoveryEngine;
use crate::pool::ConnectionPool;
use crate::toolset::{
    BuildOptions, PersonaDelegate, ToolsetDelegate, ToolsetEngine,
};
use chrono::{DateTime, Utc};
use hub_core::{HubError, Result, ToolDescriptor, ToolReference};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

/// Which catalog is advertised to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Toolset management tools are exposed
    Configuration,
    /// The curated (or full) downstream catalog is exposed
    Operational,
}

/// Emitted on every mode flip so the listener can push a list-changed
/// notification
#[derive(Debug, Clone)]
pub struct ModeChangedEvent {
    pub previous: OperatingMode,
    pub current: OperatingMode,
    pub timestamp: DateTime<Utc>,
}

const ENTER_CONFIGURATION: &str = "enter-configuration-mode";

const CONFIGURATION_TOOLS: [&str; 9] = [
    "build-toolset",
    "equip-toolset",
    "unequip-toolset",
    "delete-toolset",
    "list-toolsets",
    "inspect-toolset",
    "list-all-tools",
    "activate-persona",
    "deactivate-persona",
];

/// Routes tool listings and calls according to the current mode
pub struct ToolRouter {
    pool: Arc<ConnectionPool>,
    discovery: Arc<DiscoveryEngine>,
    engine: Arc<ToolsetEngine>,
    persona: Arc<PersonaDelegate>,
    mode: RwLock<OperatingMode>,
    events: broadcast::Sender<ModeChangedEvent>,
}

impl ToolRouter {
    /// Initial mode is derived from whether anything is already active
    pub async fn new(
        pool: Arc<ConnectionPool>,
        discovery: Arc<DiscoveryEngine>,
        engine: Arc<ToolsetEngine>,
        persona: Arc<PersonaDelegate>,
    ) -> Self {
        let initial = if engine.has_active().await || persona.has_active().await {
            OperatingMode::Operational
        } else {
            OperatingMode::Configuration
        };
        let (events, _) = broadcast::channel(64);

        Self {
            pool,
            discovery,
            engine,
            persona,
            mode: RwLock::new(initial),
            events,
        }
    }

    pub async fn mode(&self) -> OperatingMode {
        *self.mode.read().await
    }

    /// Subscribe to mode transitions
    pub fn subscribe(&self) -> broadcast::Receiver<ModeChangedEvent> {
        self.events.subscribe()
    }

    /// The toolset source currently in charge: the persona delegate while a
    /// persona is active, the regular engine otherwise.
    async fn delegate(&self) -> Arc<dyn ToolsetDelegate> {
        if self.persona.has_active().await {
            self.persona.clone()
        } else {
            self.engine.clone()
        }
    }

    async fn set_mode(&self, mode: OperatingMode) {
        let previous = {
            let mut current = self.mode.write().await;
            let previous = *current;
            *current = mode;
            previous
        };
        if previous != mode {
            info!("Mode changed: {:?} -> {:?}", previous, mode);
            let _ = self.events.send(ModeChangedEvent {
                previous,
                current: mode,
                timestamp: Utc::now(),
            });
        }
    }

    /// The catalog advertised to the client under the current mode
    pub async fn advertised_tools(&self) -> Result<Vec<ToolDescriptor>> {
        match self.mode().await {
            OperatingMode::Configuration => Ok(configuration_catalog()),
            OperatingMode::Operational => {
                let delegate = self.delegate().await;
                let mut tools: Vec<ToolDescriptor> = if delegate.has_active().await {
                    delegate
                        .active_tools()
                        .await?
                        .into_iter()
                        .map(|t| t.namespaced_descriptor())
                        .collect()
                } else {
                    self.discovery
                        .available_tools()
                        .await
                        .into_iter()
                        .map(|t| t.namespaced_descriptor())
                        .collect()
                };
                tools.push(enter_configuration_descriptor());
                Ok(tools)
            }
        }
    }

    /// Flip to configuration mode explicitly
    pub async fn enter_configuration_mode(&self) -> Result<Value> {
        self.set_mode(OperatingMode::Configuration).await;
        Ok(json!({ "mode": "configuration" }))
    }

    /// Handle one inbound tool call: meta tools are handled here, anything
    /// else is routed to the owning downstream connection.
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
        debug!("Inbound tool call: {}", name);

        if name == ENTER_CONFIGURATION {
            return self.enter_configuration_mode().await;
        }

        if CONFIGURATION_TOOLS.contains(&name) {
            if self.mode().await != OperatingMode::Configuration {
                return Err(HubError::routing(format!(
                    "'{}' is only available in configuration mode",
                    name
                )));
            }
            return self.handle_configuration_call(name, args).await;
        }

        if self.mode().await == OperatingMode::Configuration {
            return Err(HubError::routing(format!(
                "Operational tool '{}' is not available in configuration mode",
                name
            )));
        }

        self.route_downstream(name, args).await
    }

    async fn route_downstream(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self
            .discovery
            .get_tool(name)
            .await
            .ok_or_else(|| HubError::tool_not_found(name.to_string()))?;

        // A curated surface only exposes the active toolset's tools
        let delegate = self.delegate().await;
        if delegate.has_active().await {
            let visible = delegate.active_tools().await?;
            if !visible.iter().any(|t| t.namespaced_name == name) {
                return Err(HubError::tool_not_found(format!(
                    "'{}' is not part of the active toolset",
                    name
                )));
            }
        }

        let client = self.pool.client(&tool.server).await.ok_or_else(|| {
            HubError::routing(format!(
                "No connected server owns tool '{}' (server '{}' is unavailable)",
                name, tool.server
            ))
        })?;

        client.call(&tool.name, args).await
    }

    async fn handle_configuration_call(&self, name: &str, args: Value) -> Result<Value> {
        match name {
            "build-toolset" => self.config_build(args).await,
            "equip-toolset" => self.config_equip(args).await,
            "unequip-toolset" => self.config_unequip().await,
            "delete-toolset" => self.config_delete(args).await,
            "list-toolsets" => self.config_list().await,
            "inspect-toolset" => self.config_inspect(args).await,
            "list-all-tools" => self.config_list_all_tools().await,
            "activate-persona" => self.config_activate_persona(args).await,
            "deactivate-persona" => self.config_deactivate_persona().await,
            other => Err(HubError::tool_not_found(other.to_string())),
        }
    }

    fn reject_while_persona_active(&self, operation: &str, persona: &str) -> HubError {
        HubError::validation(format!(
            "Cannot {} while persona '{}' is active; deactivate it first",
            operation, persona
        ))
    }

    async fn config_build(&self, args: Value) -> Result<Value> {
        if let Some(active) = self.persona.active_persona().await {
            return Err(self.reject_while_persona_active("build a toolset", &active.persona_name));
        }

        let name = require_str(&args, "name")?;
        let entries = args
            .get("tools")
            .and_then(|v| v.as_array())
            .ok_or_else(|| HubError::validation("tools array is required"))?;

        let mut refs = Vec::with_capacity(entries.len());
        for entry in entries {
            refs.push(self.parse_reference(entry).await?);
        }

        let options = BuildOptions {
            description: args
                .get("description")
                .and_then(|v| v.as_str())
                .map(String::from),
            auto_equip: args.get("autoEquip").and_then(|v| v.as_bool()).unwrap_or(false),
            overwrite: args.get("overwrite").and_then(|v| v.as_bool()).unwrap_or(false),
        };
        let auto_equip = options.auto_equip;

        let config = self.engine.build(name, refs, options).await?;
        if auto_equip {
            self.set_mode(OperatingMode::Operational).await;
        }

        Ok(json!({
            "toolset": config.name,
            "version": config.version,
            "tools": config.tools.len(),
            "equipped": auto_equip,
        }))
    }

    /// A reference entry is either a plain namespaced name, pinned to the
    /// live hash at build time, or an object carrying an explicit refId.
    async fn parse_reference(&self, entry: &Value) -> Result<ToolReference> {
        if let Some(name) = entry.as_str() {
            let hash = self
                .discovery
                .get_tool(name)
                .await
                .map(|t| t.content_hash);
            return Ok(match hash {
                Some(hash) => ToolReference::with_hash(name, hash),
                None => ToolReference::new(name),
            });
        }

        if let Some(obj) = entry.as_object() {
            let name = obj
                .get("namespacedName")
                .and_then(|v| v.as_str())
                .ok_or_else(|| HubError::validation("tool entry missing namespacedName"))?;
            return Ok(match obj.get("refId").and_then(|v| v.as_str()) {
                Some(ref_id) => ToolReference::with_hash(name, ref_id),
                None => ToolReference::new(name),
            });
        }

        Err(HubError::validation(
            "tool entries must be names or {namespacedName, refId} objects",
        ))
    }

    async fn config_equip(&self, args: Value) -> Result<Value> {
        let name = require_str(&args, "name")?;

        // Equipping a regular toolset displaces an active persona cleanly
        if self.persona.has_active().await {
            self.persona.deactivate().await?;
        }

        self.engine.equip(name).await?;
        self.set_mode(OperatingMode::Operational).await;

        Ok(json!({ "equipped": name, "mode": "operational" }))
    }

    async fn config_unequip(&self) -> Result<Value> {
        let delegate = self.delegate().await;
        let outcome = delegate.unequip().await?;
        Ok(json!({ "wasActive": outcome.was_active }))
    }

    async fn config_delete(&self, args: Value) -> Result<Value> {
        if let Some(active) = self.persona.active_persona().await {
            return Err(self.reject_while_persona_active("delete a toolset", &active.persona_name));
        }

        let name = require_str(&args, "name")?;
        self.engine.delete(name).await?;
        Ok(json!({ "deleted": name }))
    }

    async fn config_list(&self) -> Result<Value> {
        let toolsets = self.engine.list_toolsets().await?;
        let active = self.engine.active_toolset().await;
        let persona = self.persona.active_persona().await;

        Ok(json!({
            "toolsets": toolsets.iter().map(|t| json!({
                "name": t.name,
                "description": t.description,
                "tools": t.tool_count,
                "createdAt": t.created_at,
                "active": active.as_deref() == Some(t.name.as_str()),
            })).collect::<Vec<_>>(),
            "activePersona": persona.map(|p| p.persona_name),
        }))
    }

    async fn config_inspect(&self, args: Value) -> Result<Value> {
        let name = require_str(&args, "name")?;
        let config = self
            .engine
            .get_toolset(name)
            .await?
            .ok_or_else(|| HubError::not_found(format!("Toolset '{}' does not exist", name)))?;

        let mut tools = Vec::with_capacity(config.tools.len());
        for reference in &config.tools {
            let resolution = self.discovery.resolve_reference(reference, true).await;
            tools.push(json!({
                "namespacedName": reference.namespaced_name,
                "refId": reference.ref_id,
                "resolves": resolution.is_ok(),
                "stale": resolution.map(|r| r.stale).unwrap_or(false),
            }));
        }

        Ok(json!({
            "name": config.name,
            "description": config.description,
            "version": config.version,
            "createdAt": config.created_at,
            "tools": tools,
        }))
    }

    async fn config_list_all_tools(&self) -> Result<Value> {
        let tools = self.discovery.available_tools().await;
        Ok(json!({
            "count": tools.len(),
            "tools": tools.iter().map(|t| json!({
                "name": t.namespaced_name,
                "server": t.server,
                "description": t.descriptor.description,
                "contentHash": t.content_hash,
            })).collect::<Vec<_>>(),
        }))
    }

    async fn config_activate_persona(&self, args: Value) -> Result<Value> {
        let path = require_str(&args, "path")?;
        let activation = self.persona.activate(Path::new(path)).await?;
        self.set_mode(OperatingMode::Operational).await;

        Ok(json!({
            "persona": activation.persona_name,
            "toolset": activation.active_toolset,
            "resolvedTools": activation.resolved_tools,
            "warnings": activation.warnings,
            "mode": "operational",
        }))
    }

    async fn config_deactivate_persona(&self) -> Result<Value> {
        let outcome = self.persona.deactivate().await?;
        Ok(json!({
            "wasActive": outcome.was_active,
            "restoredToolset": outcome.restored_toolset,
        }))
    }
}

fn require_str<'a>(args: &'a Value, field: &str) -> Result<&'a str> {
    args.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HubError::validation(format!("{} is required", field)))
}

fn enter_configuration_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        ENTER_CONFIGURATION,
        Some("Switch to configuration mode to manage toolsets. The advertised tool list changes."),
        json!({ "type": "object", "properties": {} }),
    )
}

/// The configuration-mode catalog
fn configuration_catalog() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "build-toolset",
            Some("Create a named toolset from namespaced tool names. Every referenced tool must exist. Pass autoEquip to activate it immediately."),
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Toolset name (lowercase letters, digits, hyphens)"
                    },
                    "description": { "type": "string" },
                    "tools": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Namespaced tool names, e.g. 'git.status'"
                    },
                    "autoEquip": { "type": "boolean", "default": false },
                    "overwrite": { "type": "boolean", "default": false }
                },
                "required": ["name", "tools"]
            }),
        ),
        ToolDescriptor::new(
            "equip-toolset",
            Some("Activate a saved toolset. Switches back to operational mode on success."),
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Toolset to activate" }
                },
                "required": ["name"]
            }),
        ),
        ToolDescriptor::new(
            "unequip-toolset",
            Some("Clear the active toolset so every discovered tool is visible again."),
            json!({ "type": "object", "properties": {} }),
        ),
        ToolDescriptor::new(
            "delete-toolset",
            Some("Delete a saved toolset. Unequips it first if it is active."),
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Toolset to delete" }
                },
                "required": ["name"]
            }),
        ),
        ToolDescriptor::new(
            "list-toolsets",
            Some("List saved toolsets and which one is active."),
            json!({ "type": "object", "properties": {} }),
        ),
        ToolDescriptor::new(
            "inspect-toolset",
            Some("Show a toolset's document and whether each reference still resolves."),
            json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Toolset to inspect" }
                },
                "required": ["name"]
            }),
        ),
        ToolDescriptor::new(
            "list-all-tools",
            Some("List every discovered tool across all connected servers."),
            json!({ "type": "object", "properties": {} }),
        ),
        ToolDescriptor::new(
            "activate-persona",
            Some("Activate a persona bundle from a folder path. Captures the current toolset for restore on deactivation."),
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Path to the persona bundle" }
                },
                "required": ["path"]
            }),
        ),
        ToolDescriptor::new(
            "deactivate-persona",
            Some("Deactivate the active persona and restore the previously active toolset."),
            json!({ "type": "object", "properties": {} }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DiscoveryConfig, HealthConfig, ServerDescriptor};
    use crate::health::HealthMonitor;
    use crate::transport::testing::{scripted, tool, ScriptedClient};
    use hub_state_store::MemoryStore;

    struct Fixture {
        client: Arc<ScriptedClient>,
        router: ToolRouter,
    }

    async fn fixture() -> Fixture {
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
        pool.connect_with_client(ServerDescriptor::stdio("git", "mcp-git", vec![]), client.clone())
            .await
            .unwrap();
        discovery.discover_all().await;

        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(ToolsetEngine::new(store.clone(), discovery.clone(), false));
        let persona = Arc::new(PersonaDelegate::new(
            store,
            discovery.clone(),
            engine.clone(),
            false,
        ));
        let router = ToolRouter::new(pool, discovery, engine, persona).await;

        Fixture { client, router }
    }

    #[tokio::test]
    async fn test_initial_mode_is_configuration_when_nothing_active() {
        let fx = fixture().await;
        assert_eq!(fx.router.mode().await, OperatingMode::Configuration);

        let tools = fx.router.advertised_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"build-toolset"));
        assert!(names.contains(&"equip-toolset"));
        assert!(!names.contains(&"git.status"));
    }

    #[tokio::test]
    async fn test_build_and_equip_flip_to_operational() {
        let fx = fixture().await;
        let mut modes = fx.router.subscribe();

        fx.router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.status"] }),
            )
            .await
            .unwrap();
        // Plain build does not flip the mode
        assert_eq!(fx.router.mode().await, OperatingMode::Configuration);

        let result = fx
            .router
            .call_tool("equip-toolset", json!({ "name": "dev" }))
            .await
            .unwrap();
        assert_eq!(result["equipped"], "dev");
        assert_eq!(fx.router.mode().await, OperatingMode::Operational);

        let event = modes.recv().await.unwrap();
        assert_eq!(event.previous, OperatingMode::Configuration);
        assert_eq!(event.current, OperatingMode::Operational);

        // Operational catalog: the curated tools plus the way back
        let tools = fx.router.advertised_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["git.status", "enter-configuration-mode"]
        );
    }

    #[tokio::test]
    async fn test_auto_equip_build_flips_to_operational() {
        let fx = fixture().await;
        fx.router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.status"], "autoEquip": true }),
            )
            .await
            .unwrap();
        assert_eq!(fx.router.mode().await, OperatingMode::Operational);
    }

    #[tokio::test]
    async fn test_operational_call_routes_downstream() {
        let fx = fixture().await;
        fx.router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.status"], "autoEquip": true }),
            )
            .await
            .unwrap();

        fx.router
            .call_tool("git.status", json!({ "verbose": true }))
            .await
            .unwrap();

        // The downstream server receives the un-namespaced name
        let calls = fx.client.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "status");
        assert_eq!(calls[0].1, json!({ "verbose": true }));
    }

    #[tokio::test]
    async fn test_tool_outside_active_toolset_not_callable() {
        let fx = fixture().await;
        fx.router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.status"], "autoEquip": true }),
            )
            .await
            .unwrap();

        // git.log exists but is not part of the equipped toolset
        let err = fx
            .router
            .call_tool("git.log", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool-not-found");

        let err = fx
            .router
            .call_tool("git.ghost", json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "tool-not-found");
    }

    #[tokio::test]
    async fn test_mode_gating_of_calls() {
        let fx = fixture().await;

        // Operational tool in configuration mode
        let err = fx.router.call_tool("git.status", json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "routing");

        fx.router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.status"], "autoEquip": true }),
            )
            .await
            .unwrap();

        // Configuration tool in operational mode
        let err = fx
            .router
            .call_tool("delete-toolset", json!({ "name": "dev" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "routing");

        // The explicit way back always works
        fx.router
            .call_tool(ENTER_CONFIGURATION, json!({}))
            .await
            .unwrap();
        assert_eq!(fx.router.mode().await, OperatingMode::Configuration);
    }

    #[tokio::test]
    async fn test_build_pins_live_hashes() {
        let fx = fixture().await;
        fx.router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.status"] }),
            )
            .await
            .unwrap();

        let inspected = fx
            .router
            .call_tool("inspect-toolset", json!({ "name": "dev" }))
            .await
            .unwrap();
        assert_eq!(inspected["tools"][0]["resolves"], true);
        assert_eq!(inspected["tools"][0]["stale"], false);
        assert!(inspected["tools"][0]["refId"].is_string());
    }

    #[tokio::test]
    async fn test_mutations_rejected_while_persona_active() {
        let fx = fixture().await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("persona.json"),
            r#"{
                "name": "reviewer",
                "toolsets": [{"name": "review", "tools": ["git.status"]}],
                "defaultToolset": "review"
            }"#,
        )
        .unwrap();

        let result = fx
            .router
            .call_tool(
                "activate-persona",
                json!({ "path": dir.path().to_str().unwrap() }),
            )
            .await
            .unwrap();
        assert_eq!(result["persona"], "reviewer");
        assert_eq!(fx.router.mode().await, OperatingMode::Operational);

        fx.router.call_tool(ENTER_CONFIGURATION, json!({})).await.unwrap();

        let err = fx
            .router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.status"] }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = fx
            .router
            .call_tool("delete-toolset", json!({ "name": "dev" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");

        let result = fx
            .router
            .call_tool("deactivate-persona", json!({}))
            .await
            .unwrap();
        assert_eq!(result["wasActive"], true);
    }

    #[tokio::test]
    async fn test_equip_displaces_active_persona() {
        let fx = fixture().await;

        fx.router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.log"] }),
            )
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("persona.json"),
            r#"{
                "name": "reviewer",
                "toolsets": [{"name": "review", "tools": ["git.status"]}],
                "defaultToolset": "review"
            }"#,
        )
        .unwrap();
        fx.router
            .call_tool(
                "activate-persona",
                json!({ "path": dir.path().to_str().unwrap() }),
            )
            .await
            .unwrap();

        fx.router.call_tool(ENTER_CONFIGURATION, json!({})).await.unwrap();
        fx.router
            .call_tool("equip-toolset", json!({ "name": "dev" }))
            .await
            .unwrap();

        // Exactly one source is active afterwards
        let tools = fx.router.advertised_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["git.log", "enter-configuration-mode"]);
    }

    #[tokio::test]
    async fn test_unequip_is_idempotent_through_the_catalog() {
        let fx = fixture().await;
        fx.router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.status"], "autoEquip": true }),
            )
            .await
            .unwrap();

        fx.router.call_tool(ENTER_CONFIGURATION, json!({})).await.unwrap();
        let result = fx.router.call_tool("unequip-toolset", json!({})).await.unwrap();
        assert_eq!(result["wasActive"], true);

        let result = fx.router.call_tool("unequip-toolset", json!({})).await.unwrap();
        assert_eq!(result["wasActive"], false);
    }

    #[tokio::test]
    async fn test_unequipped_operational_catalog_shows_everything() {
        let fx = fixture().await;
        fx.router
            .call_tool(
                "build-toolset",
                json!({ "name": "dev", "tools": ["git.status"], "autoEquip": true }),
            )
            .await
            .unwrap();

        // Clearing the toolset leaves operational mode exposing the full
        // discovered catalog
        fx.router.engine.unequip().await.unwrap();

        let tools = fx.router.advertised_tools().await.unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["git.log", "git.status", "enter-configuration-mode"]
        );
    }
}

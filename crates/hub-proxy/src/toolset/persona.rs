//! Persona delegate: bundle-sourced toolsets that temporarily override
//! regular toolset management
//!
//! A persona bundle is a folder (or a single file) declaring one or more
//! named toolsets over namespaced tool names. Activation captures whatever
//! regular toolset was active so deactivation can restore it
//! deterministically; deactivation is idempotent.

use crate::discovery::{DiscoveredTool, DiscoveryEngine};
use crate::toolset::delegate::{DelegateType, ToolsetDelegate, ToolsetSummary, UnequipOutcome};
use crate::toolset::engine::ToolsetEngine;
use crate::toolset::{ToolsetChange, ToolsetChangedEvent};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hub_core::{
    split_namespaced, validate_toolset_name, HubError, PersonaRuntimeState, Result, ToolReference,
};
use hub_state_store::StateStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

const BUNDLE_FILES: [&str; 3] = ["persona.json", "persona.yaml", "persona.yml"];

/// One toolset declared by a bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersonaToolsetDef {
    pub name: String,
    /// Namespaced tool names ("server.tool")
    pub tools: Vec<String>,
}

/// A declarative persona bundle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersonaBundle {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub toolsets: Vec<PersonaToolsetDef>,
    pub default_toolset: String,
}

impl PersonaBundle {
    /// Load a bundle from a folder containing a persona file, or from the
    /// file itself
    pub fn load(path: &Path) -> Result<Self> {
        let file = if path.is_dir() {
            BUNDLE_FILES
                .iter()
                .map(|name| path.join(name))
                .find(|candidate| candidate.exists())
                .ok_or_else(|| {
                    HubError::validation(format!(
                        "No persona file found in bundle {}",
                        path.display()
                    ))
                })?
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&file).map_err(|e| {
            HubError::validation(format!("Cannot read persona file {}: {}", file.display(), e))
        })?;

        let bundle: Self = if file
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false)
        {
            serde_yaml::from_str(&content).map_err(|e| {
                HubError::validation(format!("Malformed persona file {}: {}", file.display(), e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                HubError::validation(format!("Malformed persona file {}: {}", file.display(), e))
            })?
        };

        bundle.validate()?;
        Ok(bundle)
    }

    /// Structural validation, independent of the live catalog
    pub fn validate(&self) -> Result<()> {
        validate_toolset_name(&self.name)
            .map_err(|e| HubError::validation(format!("Invalid persona name: {}", e)))?;

        if self.toolsets.is_empty() {
            return Err(HubError::validation(format!(
                "Persona '{}' declares no toolsets",
                self.name
            )));
        }

        for toolset in &self.toolsets {
            validate_toolset_name(&toolset.name).map_err(|e| {
                HubError::validation(format!(
                    "Invalid toolset name in persona '{}': {}",
                    self.name, e
                ))
            })?;
            for tool in &toolset.tools {
                if split_namespaced(tool).is_none() {
                    return Err(HubError::validation(format!(
                        "Persona '{}' toolset '{}' lists '{}', which is not a namespaced tool name",
                        self.name, toolset.name, tool
                    )));
                }
            }
        }

        if self.toolset(&self.default_toolset).is_none() {
            return Err(HubError::validation(format!(
                "Persona '{}' defaults to unknown toolset '{}'",
                self.name, self.default_toolset
            )));
        }

        Ok(())
    }

    fn toolset(&self, name: &str) -> Option<&PersonaToolsetDef> {
        self.toolsets.iter().find(|t| t.name == name)
    }
}

/// Status view of the active persona
#[derive(Debug, Clone)]
pub struct PersonaActivation {
    pub persona_name: String,
    pub activation_id: String,
    pub activated_at: DateTime<Utc>,
    pub active_toolset: String,
    pub source: PathBuf,
    /// Tools declared by the bundle that did not resolve at activation
    pub warnings: Vec<String>,
    /// Resolved tool count of the active persona toolset
    pub resolved_tools: usize,
}

/// Result of a deactivation; idempotent callers check `was_active`
#[derive(Debug, Clone)]
pub struct DeactivationOutcome {
    pub was_active: bool,
    pub restored_toolset: Option<String>,
}

struct ActiveState {
    bundle: PersonaBundle,
    activation: PersonaActivation,
    previous_toolset: Option<String>,
}

/// The persona-backed [`ToolsetDelegate`]
pub struct PersonaDelegate {
    store: Arc<dyn StateStore>,
    discovery: Arc<DiscoveryEngine>,
    engine: Arc<ToolsetEngine>,
    allow_stale_refs: bool,
    state: RwLock<Option<ActiveState>>,
    mutation: Mutex<()>,
    events: broadcast::Sender<ToolsetChangedEvent>,
}

impl PersonaDelegate {
    pub fn new(
        store: Arc<dyn StateStore>,
        discovery: Arc<DiscoveryEngine>,
        engine: Arc<ToolsetEngine>,
        allow_stale_refs: bool,
    ) -> Self {
        let events = engine.event_sender();
        Self {
            store,
            discovery,
            engine,
            allow_stale_refs,
            state: RwLock::new(None),
            mutation: Mutex::new(()),
            events,
        }
    }

    fn emit(&self, change: ToolsetChange, toolset: &str) {
        let _ = self.events.send(ToolsetChangedEvent::now(change, toolset));
    }

    /// Activate a persona from a bundle path.
    ///
    /// Validates the bundle against the live catalog, captures the
    /// previously active regular toolset, and switches routing to the
    /// bundle's default toolset. An already-active persona is deactivated
    /// (and its capture restored) first.
    pub async fn activate(&self, path: &Path) -> Result<PersonaActivation> {
        let _guard = self.mutation.lock().await;

        if self.state.read().await.is_some() {
            self.deactivate_inner().await?;
        }

        let bundle = PersonaBundle::load(path)?;

        // Resolve every declared tool; unresolved ones become warnings, but
        // a default toolset with nothing usable fails the activation.
        let mut warnings = Vec::new();
        let mut default_resolved = 0usize;
        for toolset in &bundle.toolsets {
            for tool in &toolset.tools {
                match self
                    .discovery
                    .resolve_reference(&ToolReference::new(tool.clone()), self.allow_stale_refs)
                    .await
                {
                    Ok(_) => {
                        if toolset.name == bundle.default_toolset {
                            default_resolved += 1;
                        }
                    }
                    Err(e) => warnings.push(format!(
                        "{} (toolset '{}'): {}",
                        tool,
                        toolset.name,
                        e.kind()
                    )),
                }
            }
        }
        if default_resolved == 0 {
            return Err(HubError::validation(format!(
                "Persona '{}' default toolset '{}' resolves to no usable tools",
                bundle.name, bundle.default_toolset
            )));
        }

        let previous_toolset = self.engine.active_toolset().await;
        if previous_toolset.is_some() {
            self.engine.unequip().await?;
        }

        let activation = PersonaActivation {
            persona_name: bundle.name.clone(),
            activation_id: Uuid::new_v4().to_string(),
            activated_at: Utc::now(),
            active_toolset: bundle.default_toolset.clone(),
            source: path.to_path_buf(),
            warnings: warnings.clone(),
            resolved_tools: default_resolved,
        };

        let runtime = PersonaRuntimeState {
            persona_name: activation.persona_name.clone(),
            activation_id: activation.activation_id.clone(),
            activated_at: activation.activated_at,
            active_toolset: activation.active_toolset.clone(),
            previous_toolset: previous_toolset.clone(),
        };
        self.store
            .save_persona_state(&runtime)
            .await
            .map_err(HubError::from)?;

        info!(
            "Activated persona '{}' with toolset '{}' ({} tools, {} warnings)",
            activation.persona_name,
            activation.active_toolset,
            activation.resolved_tools,
            warnings.len()
        );
        if !warnings.is_empty() {
            warn!(
                "Persona '{}' activation warnings: {}",
                activation.persona_name,
                warnings.join("; ")
            );
        }

        let result = activation.clone();
        *self.state.write().await = Some(ActiveState {
            bundle,
            activation,
            previous_toolset,
        });
        self.emit(ToolsetChange::Activated, &result.active_toolset);

        Ok(result)
    }

    /// Deactivate the persona and restore the captured pre-activation state.
    /// Safe to call when nothing is active.
    pub async fn deactivate(&self) -> Result<DeactivationOutcome> {
        let _guard = self.mutation.lock().await;
        self.deactivate_inner().await
    }

    async fn deactivate_inner(&self) -> Result<DeactivationOutcome> {
        let Some(state) = self.state.write().await.take() else {
            return Ok(DeactivationOutcome {
                was_active: false,
                restored_toolset: None,
            });
        };

        // Restoration proceeds even if individual steps degrade; the
        // persona must never remain half-active.
        if let Err(e) = self.store.clear_persona_state().await {
            warn!("Failed to clear persisted persona state: {}", e);
        }

        let mut restored = None;
        if let Some(previous) = &state.previous_toolset {
            match self.engine.equip(previous).await {
                Ok(()) => restored = Some(previous.clone()),
                Err(e) => warn!(
                    "Could not restore toolset '{}' after persona '{}': {}",
                    previous, state.activation.persona_name, e
                ),
            }
        }

        info!(
            "Deactivated persona '{}' (restored toolset: {:?})",
            state.activation.persona_name, restored
        );
        self.emit(ToolsetChange::Cleared, &state.activation.active_toolset);

        Ok(DeactivationOutcome {
            was_active: true,
            restored_toolset: restored,
        })
    }

    /// Status view of the active persona, if any
    pub async fn active_persona(&self) -> Option<PersonaActivation> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.activation.clone())
    }

    async fn resolve_toolset(&self, def: &PersonaToolsetDef) -> Vec<DiscoveredTool> {
        let mut tools = Vec::with_capacity(def.tools.len());
        for name in &def.tools {
            match self
                .discovery
                .resolve_reference(&ToolReference::new(name.clone()), self.allow_stale_refs)
                .await
            {
                Ok(resolved) => tools.push(resolved.tool),
                Err(e) => warn!(
                    "Persona toolset '{}' references unavailable tool '{}': {}",
                    def.name, name, e
                ),
            }
        }
        tools
    }
}

#[async_trait]
impl ToolsetDelegate for PersonaDelegate {
    fn delegate_type(&self) -> DelegateType {
        DelegateType::Persona
    }

    async fn list_toolsets(&self) -> Result<Vec<ToolsetSummary>> {
        let state = self.state.read().await;
        let Some(state) = state.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(state
            .bundle
            .toolsets
            .iter()
            .map(|t| ToolsetSummary {
                name: t.name.clone(),
                description: state.bundle.description.clone(),
                tool_count: t.tools.len(),
                created_at: None,
            })
            .collect())
    }

    /// Switch between the bundle's toolsets; all-or-nothing like the
    /// regular engine
    async fn equip(&self, name: &str) -> Result<()> {
        let _guard = self.mutation.lock().await;

        let mut state = self.state.write().await;
        let active = state
            .as_mut()
            .ok_or_else(|| HubError::validation("No persona is active"))?;

        let toolset = active.bundle.toolset(name).ok_or_else(|| {
            HubError::not_found(format!(
                "Persona '{}' has no toolset '{}'",
                active.bundle.name, name
            ))
        })?;

        let mut resolved = 0usize;
        for tool in &toolset.tools {
            self.discovery
                .resolve_reference(&ToolReference::new(tool.clone()), self.allow_stale_refs)
                .await?;
            resolved += 1;
        }

        active.activation.active_toolset = name.to_string();
        active.activation.resolved_tools = resolved;

        let runtime = PersonaRuntimeState {
            persona_name: active.activation.persona_name.clone(),
            activation_id: active.activation.activation_id.clone(),
            activated_at: active.activation.activated_at,
            active_toolset: name.to_string(),
            previous_toolset: active.previous_toolset.clone(),
        };
        drop(state);

        self.store
            .save_persona_state(&runtime)
            .await
            .map_err(HubError::from)?;
        self.emit(ToolsetChange::Activated, name);
        Ok(())
    }

    async fn unequip(&self) -> Result<UnequipOutcome> {
        let outcome = self.deactivate().await?;
        Ok(UnequipOutcome {
            was_active: outcome.was_active,
        })
    }

    async fn active_toolset(&self) -> Option<String> {
        self.state
            .read()
            .await
            .as_ref()
            .map(|s| s.activation.active_toolset.clone())
    }

    async fn has_active(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn active_tools(&self) -> Result<Vec<DiscoveredTool>> {
        let def = {
            let state = self.state.read().await;
            let Some(state) = state.as_ref() else {
                return Ok(Vec::new());
            };
            state
                .bundle
                .toolset(&state.activation.active_toolset)
                .cloned()
        };

        match def {
            Some(def) => Ok(self.resolve_toolset(&def).await),
            None => Ok(Vec::new()),
        }
    }
}

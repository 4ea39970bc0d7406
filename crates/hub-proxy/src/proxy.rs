//! The owning proxy façade
//!
//! Constructs and wires every component from a config plus an injected
//! store, drives startup (connect, watch, first discovery cycle) and
//! bounded shutdown, and exposes the listener-facing surface.

use crate::config::{ProxyConfig, ServerDescriptor};
use crate::discovery::{DiscoveryEngine, DiscoveryReport, ToolsChangedEvent};
use crate::health::{HealthEvent, HealthMonitor, HealthState};
use crate::pool::{ConnectionPool, ConnectionStatus};
use crate::router::{ModeChangedEvent, OperatingMode, ToolRouter};
use crate::toolset::{
    PersonaActivation, PersonaDelegate, ToolsetChangedEvent, ToolsetDelegate, ToolsetEngine,
};
use futures::future::join_all;
use hub_core::{HubError, Result, ToolDescriptor};
use hub_state_store::StateStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Aggregate status view for the outer listener
#[derive(Debug, Clone)]
pub struct ProxyStatus {
    pub mode: OperatingMode,
    pub servers: Vec<ServerStatus>,
    pub total_tools: usize,
    pub active_toolset: Option<String>,
    pub active_persona: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub connection: ConnectionStatus,
    pub health: HealthState,
}

/// One proxy process: pool, health, discovery, toolsets, persona, routing
pub struct HubProxy {
    config: ProxyConfig,
    pool: Arc<ConnectionPool>,
    health: Arc<HealthMonitor>,
    discovery: Arc<DiscoveryEngine>,
    engine: Arc<ToolsetEngine>,
    persona: Arc<PersonaDelegate>,
    router: Arc<ToolRouter>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    initialized: RwLock<bool>,
}

impl HubProxy {
    /// Wire the component graph. All collaborators are injected; nothing is
    /// process-global.
    pub async fn new(config: ProxyConfig, store: Arc<dyn StateStore>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| HubError::validation(e.to_string()))?;

        let pool = Arc::new(ConnectionPool::new(config.advertised_endpoint.clone()));
        let health = Arc::new(HealthMonitor::new(config.health.clone()));
        let discovery = Arc::new(DiscoveryEngine::new(
            pool.clone(),
            health.clone(),
            config.discovery.clone(),
        ));

        let allow_stale = config.toolsets.allow_stale_refs;
        let engine = Arc::new(ToolsetEngine::new(store.clone(), discovery.clone(), allow_stale));
        let persona = Arc::new(PersonaDelegate::new(
            store.clone(),
            discovery.clone(),
            engine.clone(),
            allow_stale,
        ));
        let router = Arc::new(
            ToolRouter::new(
                pool.clone(),
                discovery.clone(),
                engine.clone(),
                persona.clone(),
            )
            .await,
        );

        // A persona record surviving from a previous process cannot be
        // restored: the bundle state died with that process.
        if let Ok(Some(stale)) = store.load_persona_state().await {
            warn!(
                "Discarding stale persona runtime state for '{}' from a previous run",
                stale.persona_name
            );
            if let Err(e) = store.clear_persona_state().await {
                warn!("Failed to clear stale persona state: {}", e);
            }
        }

        Ok(Self {
            config,
            pool,
            health,
            discovery,
            engine,
            persona,
            router,
            background_tasks: Mutex::new(Vec::new()),
            initialized: RwLock::new(false),
        })
    }

    /// Connect every enabled server, start health watches, run the first
    /// discovery cycle, and wire discovery diffs into the composition
    /// engine. Idempotent.
    pub async fn initialize(&self) -> Result<()> {
        if *self.initialized.read().await {
            return Ok(());
        }

        let servers: Vec<_> = self
            .config
            .enabled_servers()
            .into_iter()
            .cloned()
            .collect();
        info!("Initializing proxy with {} configured servers", servers.len());

        join_all(
            servers
                .into_iter()
                .map(|descriptor| self.pool.connect(descriptor)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<()>>>()?;

        for server in self.pool.connected_servers().await {
            if let Some(client) = self.pool.client(&server).await {
                self.health.watch(&server, client).await;
            }
        }

        let report = self.discovery.discover_all().await;

        // Discovery diffs feed the composition engine so staleness of the
        // active toolset is surfaced as it happens.
        let mut events = self.discovery.subscribe();
        let engine = self.engine.clone();
        let pool = self.pool.clone();
        let mut health_events = self.health.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => engine.handle_tools_changed(&event).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("Toolset reaction lagged behind {} discovery events", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    event = health_events.recv() => match event {
                        Ok(HealthEvent { server, current, .. }) => {
                            pool.note_health(&server, current == HealthState::Healthy).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        let mut tasks = self.background_tasks.lock().await;
        tasks.push(handle);

        // Optional background refresh, so a long-lived proxy notices
        // downstream schema changes without an explicit refresh call
        if let Some(interval) = self.config.discovery.refresh_interval() {
            let discovery = self.discovery.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::time::sleep(interval).await;
                    discovery.discover_all().await;
                }
            }));
        }
        drop(tasks);

        *self.initialized.write().await = true;
        info!(
            "Proxy initialized: {} servers connected, {} tools discovered",
            report.succeeded.len(),
            self.discovery.available_tools().await.len()
        );
        Ok(())
    }

    /// Stop health probing and tear down every connection, collecting all
    /// errors. After `grace` elapses, shutdown proceeds forcibly.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        info!("Shutting down proxy");

        for handle in self.background_tasks.lock().await.drain(..) {
            handle.abort();
        }
        self.health.stop_all().await;
        *self.initialized.write().await = false;

        match tokio::time::timeout(grace, self.pool.disconnect_all()).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Shutdown exceeded {:?}; abandoning remaining teardowns", grace);
                Ok(())
            }
        }
    }

    /// Re-run discovery across all connected, healthy servers
    pub async fn refresh(&self) -> DiscoveryReport {
        self.discovery.discover_all().await
    }

    /// Add a server at runtime: connect it, start probing, discover its tools
    pub async fn add_server(&self, descriptor: ServerDescriptor) -> Result<()> {
        let name = descriptor.name.clone();
        self.pool.connect(descriptor).await?;

        if let Some(client) = self.pool.client(&name).await {
            self.health.watch(&name, client).await;
            self.discovery.discover_server(&name).await?;
        }
        Ok(())
    }

    /// Remove a server: stop its probe loop, drop its catalog snapshot,
    /// and disconnect it
    pub async fn remove_server(&self, name: &str) -> Result<()> {
        self.health.unwatch(name).await;
        self.discovery.remove_server(name).await;
        self.pool.remove(name).await
    }

    /// The tool catalog currently advertised to the client
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.router.advertised_tools().await
    }

    /// Handle one inbound tool call
    pub async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
        self.router.call_tool(name, args).await
    }

    /// Whether any toolset (regular or persona) is active
    pub async fn has_active_toolset(&self) -> bool {
        self.engine.has_active().await || self.persona.has_active().await
    }

    /// Status view of the active persona, if any
    pub async fn active_persona(&self) -> Option<PersonaActivation> {
        self.persona.active_persona().await
    }

    pub async fn status(&self) -> ProxyStatus {
        let mut servers = Vec::new();
        for connection in self.pool.statuses().await {
            let health = self.health.state(&connection.name).await;
            servers.push(ServerStatus { connection, health });
        }

        ProxyStatus {
            mode: self.router.mode().await,
            servers,
            total_tools: self.discovery.available_tools().await.len(),
            active_toolset: if self.persona.has_active().await {
                self.persona.active_toolset().await
            } else {
                self.engine.active_toolset().await
            },
            active_persona: self
                .persona
                .active_persona()
                .await
                .map(|p| p.persona_name),
        }
    }

    /// Catalog-change notifications for the listener
    pub fn subscribe_toolset_events(&self) -> broadcast::Receiver<ToolsetChangedEvent> {
        self.engine.subscribe()
    }

    /// Mode-change notifications for the listener
    pub fn subscribe_mode_events(&self) -> broadcast::Receiver<ModeChangedEvent> {
        self.router.subscribe()
    }

    /// Per-server discovery diffs
    pub fn subscribe_discovery_events(&self) -> broadcast::Receiver<ToolsChangedEvent> {
        self.discovery.subscribe()
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn discovery(&self) -> &Arc<DiscoveryEngine> {
        &self.discovery
    }

    pub fn router(&self) -> &Arc<ToolRouter> {
        &self.router
    }
}

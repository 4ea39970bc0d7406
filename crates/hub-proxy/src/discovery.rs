//! Tool discovery engine: the authoritative cross-server tool catalog
//!
//! Each discovery cycle queries every connected, healthy server, hashes
//! every tool, and replaces that server's cached snapshot whole. Readers see
//! either the pre- or post-refresh snapshot for a server, never a partial
//! one. Diffs against the previous snapshot are published once per server
//! per cycle, after the whole cycle has completed.

use crate::config::DiscoveryConfig;
use crate::hash::content_hash;
use crate::health::HealthMonitor;
use crate::pool::ConnectionPool;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use hub_core::{namespaced, split_namespaced, HubError, Result, ToolDescriptor, ToolReference};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// One tool as known to the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredTool {
    /// Downstream (un-namespaced) tool name
    pub name: String,
    /// Owning server
    pub server: String,
    /// Unique identity across the aggregated catalog: "server.tool"
    pub namespaced_name: String,
    /// Raw definition as the server reported it
    pub descriptor: ToolDescriptor,
    /// Stable hash over name + description + schema
    pub content_hash: String,
    pub discovered_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Server health at the time this snapshot was taken
    pub server_healthy: bool,
}

impl DiscoveredTool {
    /// The descriptor under its namespaced name, as advertised to clients
    pub fn namespaced_descriptor(&self) -> ToolDescriptor {
        let mut descriptor = self.descriptor.clone();
        descriptor.name = self.namespaced_name.clone();
        descriptor
    }
}

/// Classification of one tool across two consecutive snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct ToolChange {
    pub kind: ChangeKind,
    pub namespaced_name: String,
    pub previous_hash: Option<String>,
    pub current_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl ChangeSummary {
    pub fn has_changes(&self) -> bool {
        self.added + self.updated + self.removed > 0
    }
}

/// Published once per server per completed discovery cycle.
///
/// An event with an empty change list still means "discovery ran"; a server
/// skipped as unhealthy produces no event at all.
#[derive(Debug, Clone)]
pub struct ToolsChangedEvent {
    pub server: String,
    pub changes: Vec<ToolChange>,
    pub summary: ChangeSummary,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one discovery cycle
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: Vec<String>,
    pub duration: Duration,
}

/// A reference resolved against the live catalog
#[derive(Debug, Clone)]
pub struct ResolvedTool {
    pub tool: DiscoveredTool,
    /// True when a hash mismatch was let through in lenient mode
    pub stale: bool,
}

/// Maintains per-server tool snapshots and answers catalog queries
pub struct DiscoveryEngine {
    pool: Arc<ConnectionPool>,
    health: Arc<HealthMonitor>,
    call_timeout: Duration,
    snapshots: RwLock<HashMap<String, Arc<Vec<DiscoveredTool>>>>,
    events: broadcast::Sender<ToolsChangedEvent>,
}

impl DiscoveryEngine {
    pub fn new(pool: Arc<ConnectionPool>, health: Arc<HealthMonitor>, config: DiscoveryConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            pool,
            health,
            call_timeout: config.call_timeout(),
            snapshots: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Subscribe to per-server change events
    pub fn subscribe(&self) -> broadcast::Receiver<ToolsChangedEvent> {
        self.events.subscribe()
    }

    /// Run one discovery cycle across every connected, healthy server.
    ///
    /// One server failing never aborts the cycle for the rest; its previous
    /// snapshot stays in place and the failure lands in the report.
    pub async fn discover_all(&self) -> DiscoveryReport {
        let started = std::time::Instant::now();

        let mut candidates = Vec::new();
        let mut skipped = Vec::new();
        for server in self.pool.connected_servers().await {
            if self.health.is_healthy(&server).await {
                candidates.push(server);
            } else {
                debug!("Skipping unhealthy server '{}' in discovery", server);
                skipped.push(server);
            }
        }

        let fetches = join_all(candidates.iter().map(|server| async move {
            (server.clone(), self.fetch_tools(server).await)
        }))
        .await;

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut pending_events = Vec::new();

        for (server, fetch) in fetches {
            match fetch {
                Ok(descriptors) => {
                    let event = self.apply_snapshot(&server, descriptors).await;
                    pending_events.push(event);
                    succeeded.push(server);
                }
                Err(e) => {
                    warn!("Discovery failed for server '{}': {}", server, e);
                    failed.push((server, e.to_string()));
                }
            }
        }

        // Events go out only once the cycle is complete, so any reaction
        // they trigger observes the fully refreshed catalog.
        for event in pending_events {
            let _ = self.events.send(event);
        }

        let report = DiscoveryReport {
            succeeded,
            failed,
            skipped,
            duration: started.elapsed(),
        };
        info!(
            "Discovery cycle: {} refreshed, {} failed, {} skipped in {:?}",
            report.succeeded.len(),
            report.failed.len(),
            report.skipped.len(),
            report.duration
        );
        report
    }

    /// Refresh a single server and publish its diff
    pub async fn discover_server(&self, server: &str) -> Result<ChangeSummary> {
        if !self.health.is_healthy(server).await {
            return Err(HubError::discovery(server, "server is unhealthy"));
        }

        let descriptors = self.fetch_tools(server).await?;
        let event = self.apply_snapshot(server, descriptors).await;
        let summary = event.summary;
        let _ = self.events.send(event);
        Ok(summary)
    }

    async fn fetch_tools(&self, server: &str) -> Result<Vec<ToolDescriptor>> {
        let client = self
            .pool
            .client(server)
            .await
            .ok_or_else(|| HubError::discovery(server, "no connected client"))?;

        match tokio::time::timeout(self.call_timeout, client.list_tools()).await {
            Ok(Ok(tools)) => Ok(tools),
            Ok(Err(e)) => Err(HubError::discovery(server, e.to_string())),
            Err(_) => Err(HubError::timeout(format!(
                "tools/list against server '{}' exceeded {:?}",
                server, self.call_timeout
            ))),
        }
    }

    /// Build the new snapshot, diff it against the cached one, and replace
    /// the cache entry whole.
    async fn apply_snapshot(
        &self,
        server: &str,
        descriptors: Vec<ToolDescriptor>,
    ) -> ToolsChangedEvent {
        let now = Utc::now();
        let previous = self.snapshots.read().await.get(server).cloned();
        let previous_by_name: HashMap<&str, &DiscoveredTool> = previous
            .as_deref()
            .map(|tools| {
                tools
                    .iter()
                    .map(|t| (t.namespaced_name.as_str(), t))
                    .collect()
            })
            .unwrap_or_default();

        let mut snapshot: Vec<DiscoveredTool> = Vec::with_capacity(descriptors.len());
        let mut changes = Vec::new();
        let mut summary = ChangeSummary::default();

        for descriptor in descriptors {
            let ns_name = namespaced(server, &descriptor.name);
            if snapshot.iter().any(|t| t.namespaced_name == ns_name) {
                warn!("Server '{}' reported tool '{}' twice; keeping the first", server, descriptor.name);
                continue;
            }

            let hash = content_hash(
                &descriptor.name,
                descriptor.description.as_deref(),
                &descriptor.input_schema,
            );

            let (kind, discovered_at, last_updated) = match previous_by_name.get(ns_name.as_str()) {
                None => (ChangeKind::Added, now, now),
                Some(old) if old.content_hash == hash => {
                    (ChangeKind::Unchanged, old.discovered_at, old.last_updated)
                }
                Some(old) => (ChangeKind::Updated, old.discovered_at, now),
            };

            match kind {
                ChangeKind::Added => summary.added += 1,
                ChangeKind::Updated => summary.updated += 1,
                ChangeKind::Unchanged => summary.unchanged += 1,
                ChangeKind::Removed => unreachable!(),
            }

            changes.push(ToolChange {
                kind,
                namespaced_name: ns_name.clone(),
                previous_hash: previous_by_name
                    .get(ns_name.as_str())
                    .map(|old| old.content_hash.clone()),
                current_hash: Some(hash.clone()),
            });

            snapshot.push(DiscoveredTool {
                name: descriptor.name.clone(),
                server: server.to_string(),
                namespaced_name: ns_name,
                descriptor,
                content_hash: hash,
                discovered_at,
                last_updated,
                server_healthy: true,
            });
        }

        for old in previous.as_deref().map(Vec::as_slice).unwrap_or(&[]) {
            if !snapshot
                .iter()
                .any(|t| t.namespaced_name == old.namespaced_name)
            {
                summary.removed += 1;
                changes.push(ToolChange {
                    kind: ChangeKind::Removed,
                    namespaced_name: old.namespaced_name.clone(),
                    previous_hash: Some(old.content_hash.clone()),
                    current_hash: None,
                });
            }
        }

        self.snapshots
            .write()
            .await
            .insert(server.to_string(), Arc::new(snapshot));

        debug!(
            "Refreshed server '{}': +{} ~{} -{} ={}",
            server, summary.added, summary.updated, summary.removed, summary.unchanged
        );

        ToolsChangedEvent {
            server: server.to_string(),
            changes,
            summary,
            timestamp: Utc::now(),
        }
    }

    /// Drop a server's snapshot (used when a connection leaves the pool),
    /// publishing the removal of every tool it contributed.
    pub async fn remove_server(&self, server: &str) {
        let removed = self.snapshots.write().await.remove(server);
        let Some(removed) = removed else { return };

        let changes: Vec<ToolChange> = removed
            .iter()
            .map(|tool| ToolChange {
                kind: ChangeKind::Removed,
                namespaced_name: tool.namespaced_name.clone(),
                previous_hash: Some(tool.content_hash.clone()),
                current_hash: None,
            })
            .collect();

        let summary = ChangeSummary {
            removed: changes.len(),
            ..Default::default()
        };
        let _ = self.events.send(ToolsChangedEvent {
            server: server.to_string(),
            changes,
            summary,
            timestamp: Utc::now(),
        });
    }

    /// Every tool in the catalog, ordered by namespaced name
    pub async fn available_tools(&self) -> Vec<DiscoveredTool> {
        let snapshots = self.snapshots.read().await;
        let mut tools: Vec<DiscoveredTool> = snapshots
            .values()
            .flat_map(|snapshot| snapshot.iter().cloned())
            .collect();
        tools.sort_by(|a, b| a.namespaced_name.cmp(&b.namespaced_name));
        tools
    }

    /// The catalog slice contributed by one server
    pub async fn tools_for_server(&self, server: &str) -> Vec<DiscoveredTool> {
        self.snapshots
            .read()
            .await
            .get(server)
            .map(|snapshot| snapshot.as_ref().clone())
            .unwrap_or_default()
    }

    /// Look up one tool by namespaced name
    pub async fn get_tool(&self, namespaced_name: &str) -> Option<DiscoveredTool> {
        let (server, _) = split_namespaced(namespaced_name)?;
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(server)?
            .iter()
            .find(|t| t.namespaced_name == namespaced_name)
            .cloned()
    }

    /// Which server owns a namespaced tool
    pub async fn server_for_tool(&self, namespaced_name: &str) -> Option<String> {
        self.get_tool(namespaced_name).await.map(|t| t.server)
    }

    /// Resolve a saved reference against the live catalog.
    ///
    /// When the reference carries a hash and it disagrees with the live
    /// tool, strict mode treats the tool as not found; lenient mode logs a
    /// warning and returns the live tool flagged stale. A reference without
    /// a hash resolves by name alone.
    pub async fn resolve_reference(
        &self,
        reference: &ToolReference,
        allow_stale: bool,
    ) -> Result<ResolvedTool> {
        let tool = self
            .get_tool(&reference.namespaced_name)
            .await
            .ok_or_else(|| HubError::tool_not_found(reference.namespaced_name.clone()))?;

        match &reference.ref_id {
            Some(expected) if *expected != tool.content_hash => {
                if allow_stale {
                    warn!(
                        "Stale reference for '{}' allowed by policy: saved hash {}, live hash {}",
                        reference.namespaced_name, expected, tool.content_hash
                    );
                    Ok(ResolvedTool { tool, stale: true })
                } else {
                    Err(HubError::StaleReference {
                        name: reference.namespaced_name.clone(),
                        expected: expected.clone(),
                        actual: tool.content_hash.clone(),
                    })
                }
            }
            _ => Ok(ResolvedTool { tool, stale: false }),
        }
    }
}

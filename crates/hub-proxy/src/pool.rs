//! Connection pool: one owned connection per configured server
//!
//! The pool is the only owner of connection state; lifecycle transitions go
//! through a per-connection mutex, so a connect cannot race a disconnect and
//! a double-connect collapses into a no-op.

use crate::config::{ServerDescriptor, TransportKind};
use crate::transport::{build_transport, TransportClient};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use hub_core::{validate_server_name, HubError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Lifecycle state of one pooled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Reconnecting,
    Stopped,
}

/// Point-in-time view of one connection
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_healthy: Option<bool>,
}

struct EntryInner {
    state: ConnectionState,
    client: Option<Arc<dyn TransportClient>>,
    last_error: Option<String>,
    connected_at: Option<DateTime<Utc>>,
    last_healthy: Option<bool>,
}

struct ConnectionEntry {
    descriptor: ServerDescriptor,
    inner: Mutex<EntryInner>,
}

impl ConnectionEntry {
    fn new(descriptor: ServerDescriptor) -> Self {
        Self {
            descriptor,
            inner: Mutex::new(EntryInner {
                state: ConnectionState::Disconnected,
                client: None,
                last_error: None,
                connected_at: None,
                last_healthy: None,
            }),
        }
    }

    async fn status(&self) -> ConnectionStatus {
        let inner = self.inner.lock().await;
        ConnectionStatus {
            name: self.descriptor.name.clone(),
            state: inner.state,
            last_error: inner.last_error.clone(),
            connected_at: inner.connected_at,
            last_healthy: inner.last_healthy,
        }
    }
}

/// Owns the map from server name to connection
pub struct ConnectionPool {
    entries: RwLock<HashMap<String, Arc<ConnectionEntry>>>,
    advertised_endpoint: Option<String>,
}

impl ConnectionPool {
    pub fn new(advertised_endpoint: Option<String>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            advertised_endpoint,
        }
    }

    /// Connect a server, constructing the adapter for its transport kind.
    ///
    /// Expected failures (server down, spawn refused) are recorded as the
    /// `Error` state rather than returned; callers observe state. Errors are
    /// returned only for configuration problems.
    pub async fn connect(&self, descriptor: ServerDescriptor) -> Result<()> {
        if self.filter_self_reference(&descriptor) {
            return Ok(());
        }
        validate_server_name(&descriptor.name)?;
        let client: Arc<dyn TransportClient> = Arc::from(build_transport(&descriptor)?);
        self.connect_entry(descriptor, client).await
    }

    /// Connect with a pre-built client (dependency injection seam)
    pub async fn connect_with_client(
        &self,
        descriptor: ServerDescriptor,
        client: Arc<dyn TransportClient>,
    ) -> Result<()> {
        if self.filter_self_reference(&descriptor) {
            return Ok(());
        }
        validate_server_name(&descriptor.name)?;
        self.connect_entry(descriptor, client).await
    }

    async fn connect_entry(
        &self,
        descriptor: ServerDescriptor,
        client: Arc<dyn TransportClient>,
    ) -> Result<()> {
        let name = descriptor.name.clone();

        let entry = {
            let mut entries = self.entries.write().await;
            entries
                .entry(name.clone())
                .or_insert_with(|| Arc::new(ConnectionEntry::new(descriptor)))
                .clone()
        };

        let mut inner = entry.inner.lock().await;
        if matches!(
            inner.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            debug!("Server '{}' already {:?}, skipping connect", name, inner.state);
            return Ok(());
        }

        inner.state = ConnectionState::Connecting;
        inner.last_error = None;

        match client.start().await {
            Ok(()) => {
                inner.state = ConnectionState::Connected;
                inner.client = Some(client);
                inner.connected_at = Some(Utc::now());
                info!("Connected to server: {}", name);
            }
            Err(e) => {
                inner.state = ConnectionState::Error;
                inner.last_error = Some(e.to_string());
                inner.client = None;
                warn!("Failed to connect to server '{}': {}", name, e);
            }
        }

        Ok(())
    }

    /// Tear down and re-establish one connection
    pub async fn reconnect(&self, name: &str) -> Result<()> {
        let entry = self
            .entry(name)
            .await
            .ok_or_else(|| HubError::not_found(format!("Server '{}' is not pooled", name)))?;

        let mut inner = entry.inner.lock().await;
        inner.state = ConnectionState::Reconnecting;

        if let Some(client) = inner.client.clone() {
            if let Err(e) = client.stop().await {
                warn!("Stop during reconnect of '{}' failed: {}", name, e);
            }

            match client.start().await {
                Ok(()) => {
                    inner.state = ConnectionState::Connected;
                    inner.connected_at = Some(Utc::now());
                    inner.last_error = None;
                    info!("Reconnected to server: {}", name);
                }
                Err(e) => {
                    inner.state = ConnectionState::Error;
                    inner.last_error = Some(e.to_string());
                    warn!("Reconnect to server '{}' failed: {}", name, e);
                }
            }
        } else {
            inner.state = ConnectionState::Disconnected;
        }

        Ok(())
    }

    /// Disconnect one server
    pub async fn disconnect(&self, name: &str) -> Result<()> {
        let entry = self
            .entry(name)
            .await
            .ok_or_else(|| HubError::not_found(format!("Server '{}' is not pooled", name)))?;

        let mut inner = entry.inner.lock().await;
        let client = inner.client.take();
        inner.state = ConnectionState::Stopped;
        drop(inner);

        if let Some(client) = client {
            info!("Disconnecting server: {}", name);
            client.stop().await?;
        }
        Ok(())
    }

    /// Disconnect every pooled server, attempting all teardowns and
    /// collecting every failure instead of stopping at the first.
    pub async fn disconnect_all(&self) -> Result<()> {
        let names: Vec<String> = self.entries.read().await.keys().cloned().collect();

        let results = join_all(names.iter().map(|name| async move {
            (name.clone(), self.disconnect(name).await)
        }))
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| format!("{}: {}", name, e)))
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HubError::connection(format!(
                "Teardown failed for {} connection(s): {}",
                failures.len(),
                failures.join("; ")
            )))
        }
    }

    /// Remove a server from the pool entirely, disconnecting it first
    pub async fn remove(&self, name: &str) -> Result<()> {
        let result = self.disconnect(name).await;
        self.entries.write().await.remove(name);
        result
    }

    /// The live client for a connected server
    pub async fn client(&self, name: &str) -> Option<Arc<dyn TransportClient>> {
        let entry = self.entry(name).await?;
        let inner = entry.inner.lock().await;
        if inner.state == ConnectionState::Connected {
            inner.client.clone()
        } else {
            None
        }
    }

    /// Names of all currently connected servers
    pub async fn connected_servers(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut names = Vec::new();
        for (name, entry) in entries.iter() {
            if entry.inner.lock().await.state == ConnectionState::Connected {
                names.push(name.clone());
            }
        }
        names.sort();
        names
    }

    /// Record the most recent health verdict for a server
    pub async fn note_health(&self, name: &str, healthy: bool) {
        if let Some(entry) = self.entry(name).await {
            entry.inner.lock().await.last_healthy = Some(healthy);
        }
    }

    pub async fn status(&self, name: &str) -> Option<ConnectionStatus> {
        let entry = self.entry(name).await?;
        Some(entry.status().await)
    }

    pub async fn statuses(&self) -> Vec<ConnectionStatus> {
        let entries: Vec<Arc<ConnectionEntry>> =
            self.entries.read().await.values().cloned().collect();
        let mut statuses = Vec::with_capacity(entries.len());
        for entry in entries {
            statuses.push(entry.status().await);
        }
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    async fn entry(&self, name: &str) -> Option<Arc<ConnectionEntry>> {
        self.entries.read().await.get(name).cloned()
    }

    /// Detect a descriptor that would point the proxy back at itself and
    /// spawn/call it recursively. Filtered out before connecting.
    fn filter_self_reference(&self, descriptor: &ServerDescriptor) -> bool {
        if is_self_referencing(descriptor, self.advertised_endpoint.as_deref()) {
            warn!(
                "Filtering self-referencing server entry '{}': it would spawn this proxy recursively",
                descriptor.name
            );
            true
        } else {
            false
        }
    }
}

fn is_self_referencing(descriptor: &ServerDescriptor, advertised: Option<&str>) -> bool {
    match descriptor.transport {
        TransportKind::Stdio => {
            let Some(command) = descriptor.command.as_deref() else {
                return false;
            };
            let Ok(current) = std::env::current_exe() else {
                return false;
            };
            let command_path = Path::new(command);
            match (command_path.canonicalize(), current.canonicalize()) {
                (Ok(a), Ok(b)) => a == b,
                // Unresolvable paths fall back to file-name equality
                _ => command_path.file_name().is_some() && command_path.file_name() == current.file_name(),
            }
        }
        TransportKind::Http | TransportKind::Sse => {
            let (Some(url), Some(advertised)) = (descriptor.url.as_deref(), advertised) else {
                return false;
            };
            url.trim_end_matches('/') == advertised.trim_end_matches('/')
        }
        TransportKind::Extension => false,
    }
}

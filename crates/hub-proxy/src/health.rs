//! Health monitor: periodic liveness probes over pooled connections
//!
//! One probe loop per watched server. A single failed probe never flips the
//! verdict; only a streak reaching the configured threshold marks a server
//! unhealthy.

use crate::config::HealthConfig;
use crate::transport::TransportClient;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Health verdict for one server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Never probed yet; does not gate discovery
    Unknown,
    Healthy,
    Unhealthy,
}

/// Emitted whenever a server's verdict changes
#[derive(Debug, Clone)]
pub struct HealthEvent {
    pub server: String,
    pub previous: HealthState,
    pub current: HealthState,
    pub timestamp: DateTime<Utc>,
}

struct Shared {
    states: RwLock<HashMap<String, HealthState>>,
    events: broadcast::Sender<HealthEvent>,
}

impl Shared {
    async fn record(&self, server: &str, verdict: HealthState) {
        let previous = {
            let mut states = self.states.write().await;
            states.insert(server.to_string(), verdict).unwrap_or(HealthState::Unknown)
        };

        if previous != verdict {
            info!("Server '{}' health: {:?} -> {:?}", server, previous, verdict);
            let _ = self.events.send(HealthEvent {
                server: server.to_string(),
                previous,
                current: verdict,
                timestamp: Utc::now(),
            });
        }
    }
}

/// Probes watched connections and publishes verdict changes
pub struct HealthMonitor {
    config: HealthConfig,
    shared: Arc<Shared>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            shared: Arc::new(Shared {
                states: RwLock::new(HashMap::new()),
                events,
            }),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to health-state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.shared.events.subscribe()
    }

    /// Start probing one server. Replaces any existing watch for the name.
    pub async fn watch(&self, server: &str, client: Arc<dyn TransportClient>) {
        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.remove(server) {
            previous.abort();
        }

        let shared = self.shared.clone();
        let name = server.to_string();
        let interval = self.config.interval();
        let ping_timeout = self.config.ping_timeout();
        let threshold = self.config.failure_threshold.max(1);

        debug!("Watching server '{}' every {:?}", server, interval);

        let handle = tokio::spawn(async move {
            let mut streak: u32 = 0;
            loop {
                tokio::time::sleep(interval).await;

                let alive = match tokio::time::timeout(ping_timeout, client.ping()).await {
                    Ok(alive) => alive,
                    Err(_) => {
                        warn!("Ping of server '{}' exceeded {:?}", name, ping_timeout);
                        false
                    }
                };

                if alive {
                    streak = 0;
                    shared.record(&name, HealthState::Healthy).await;
                } else {
                    streak += 1;
                    debug!("Server '{}' failed probe ({}/{})", name, streak, threshold);
                    if streak >= threshold {
                        shared.record(&name, HealthState::Unhealthy).await;
                    }
                }
            }
        });

        tasks.insert(server.to_string(), handle);
    }

    /// Stop probing one server and forget its verdict
    pub async fn unwatch(&self, server: &str) {
        if let Some(handle) = self.tasks.lock().await.remove(server) {
            handle.abort();
            debug!("Stopped watching server '{}'", server);
        }
        self.shared.states.write().await.remove(server);
    }

    /// Abort every probe loop
    pub async fn stop_all(&self) {
        let mut tasks = self.tasks.lock().await;
        for (server, handle) in tasks.drain() {
            handle.abort();
            debug!("Stopped watching server '{}'", server);
        }
    }

    /// Current verdict for a server
    pub async fn state(&self, server: &str) -> HealthState {
        self.shared
            .states
            .read()
            .await
            .get(server)
            .copied()
            .unwrap_or(HealthState::Unknown)
    }

    /// Whether discovery should query this server.
    /// Unknown counts as probe-pending, not as unhealthy.
    pub async fn is_healthy(&self, server: &str) -> bool {
        self.state(server).await != HealthState::Unhealthy
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        // Probe loops hold only an Arc<Shared>; abort them so no orphaned
        // timers outlive the monitor.
        if let Ok(mut tasks) = self.tasks.try_lock() {
            for (_, handle) in tasks.drain() {
                handle.abort();
            }
        }
    }
}

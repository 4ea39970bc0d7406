//! End-to-end flow across the public surface: connect scripted servers,
//! discover, compose toolsets, route calls, and switch over to a persona.

use async_trait::async_trait;
use hub_core::{HubError, Result, ToolDescriptor};
use hub_proxy::{HubProxy, ProxyConfig, ServerDescriptor, TransportClient};
use hub_state_store::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Minimal scripted server for driving the proxy from the outside
struct FakeServer {
    tools: RwLock<Vec<ToolDescriptor>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeServer {
    fn new(tools: Vec<(&str, &str)>) -> Arc<Self> {
        Arc::new(Self {
            tools: RwLock::new(
                tools
                    .into_iter()
                    .map(|(name, description)| {
                        ToolDescriptor::new(name, Some(description), json!({"type": "object"}))
                    })
                    .collect(),
            ),
            calls: Mutex::new(Vec::new()),
        })
    }

    async fn set_tools(&self, tools: Vec<(&str, &str)>) {
        *self.tools.write().await = tools
            .into_iter()
            .map(|(name, description)| {
                ToolDescriptor::new(name, Some(description), json!({"type": "object"}))
            })
            .collect();
    }
}

#[async_trait]
impl TransportClient for FakeServer {
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }

    async fn call(&self, tool: &str, args: Value) -> Result<Value> {
        self.calls.lock().await.push((tool.to_string(), args));
        Ok(json!({ "content": [{ "type": "text", "text": "ok" }] }))
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.read().await.clone())
    }

    async fn ping(&self) -> bool {
        true
    }
}

async fn proxy_with_servers(servers: Vec<(&str, Arc<FakeServer>)>) -> HubProxy {
    let proxy = HubProxy::new(ProxyConfig::default(), Arc::new(MemoryStore::new()))
        .await
        .unwrap();
    proxy.initialize().await.unwrap();

    for (name, server) in servers {
        proxy
            .pool()
            .connect_with_client(ServerDescriptor::stdio(name, "fake", vec![]), server)
            .await
            .unwrap();
    }
    proxy.refresh().await;
    proxy
}

#[tokio::test]
async fn full_compose_and_route_flow() {
    let git = FakeServer::new(vec![("status", "Show status"), ("log", "Show log")]);
    let fs = FakeServer::new(vec![("read", "Read a file")]);
    let proxy = proxy_with_servers(vec![("git", git.clone()), ("fs", fs)]).await;

    // Everything discovered under namespaced names
    let status = proxy.status().await;
    assert_eq!(status.total_tools, 3);

    // Configuration mode at startup: management catalog advertised
    let names: Vec<String> = proxy
        .list_tools()
        .await
        .unwrap()
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert!(names.contains(&"build-toolset".to_string()));

    // Build + equip, then the curated catalog is advertised
    proxy
        .call_tool(
            "build-toolset",
            json!({
                "name": "dev",
                "tools": ["git.status", "fs.read"],
                "autoEquip": true
            }),
        )
        .await
        .unwrap();

    let names: Vec<String> = proxy
        .list_tools()
        .await
        .unwrap()
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(names, vec!["fs.read", "git.status", "enter-configuration-mode"]);

    // Calls route to the owning server with the un-namespaced tool name
    proxy
        .call_tool("git.status", json!({ "short": true }))
        .await
        .unwrap();
    let calls = git.calls.lock().await;
    assert_eq!(calls.as_slice(), &[("status".to_string(), json!({ "short": true }))]);
}

#[tokio::test]
async fn equip_round_trip_returns_exactly_the_built_refs() {
    let git = FakeServer::new(vec![("status", "Show status"), ("log", "Show log")]);
    let proxy = proxy_with_servers(vec![("git", git)]).await;

    proxy
        .call_tool(
            "build-toolset",
            json!({ "name": "dev", "tools": ["git.log", "git.status"] }),
        )
        .await
        .unwrap();
    proxy
        .call_tool("equip-toolset", json!({ "name": "dev" }))
        .await
        .unwrap();

    let mut advertised: Vec<String> = proxy
        .list_tools()
        .await
        .unwrap()
        .iter()
        .map(|t| t.name.clone())
        .filter(|n| n != "enter-configuration-mode")
        .collect();
    advertised.sort();
    assert_eq!(advertised, vec!["git.log", "git.status"]);
}

#[tokio::test]
async fn stale_reference_blocks_equip_in_strict_mode() {
    let git = FakeServer::new(vec![("status", "Show status")]);
    let proxy = proxy_with_servers(vec![("git", git.clone())]).await;

    // Build pins the live hash
    proxy
        .call_tool(
            "build-toolset",
            json!({ "name": "dev", "tools": ["git.status"] }),
        )
        .await
        .unwrap();

    // The tool is silently redefined and rediscovered
    git.set_tools(vec![("status", "Completely different semantics")])
        .await;
    proxy.refresh().await;

    let err = proxy
        .call_tool("equip-toolset", json!({ "name": "dev" }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "stale-reference");

    // Nothing became active
    assert!(!proxy.has_active_toolset().await);
}

#[tokio::test]
async fn persona_switchover_and_restore() {
    let git = FakeServer::new(vec![("status", "Show status"), ("log", "Show log")]);
    let proxy = proxy_with_servers(vec![("git", git)]).await;

    proxy
        .call_tool(
            "build-toolset",
            json!({ "name": "dev", "tools": ["git.log"], "autoEquip": true }),
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

    proxy.call_tool("enter-configuration-mode", json!({})).await.unwrap();
    proxy
        .call_tool(
            "activate-persona",
            json!({ "path": dir.path().to_str().unwrap() }),
        )
        .await
        .unwrap();

    // The persona's toolset is the advertised surface now
    let names: Vec<String> = proxy
        .list_tools()
        .await
        .unwrap()
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(names, vec!["git.status", "enter-configuration-mode"]);
    assert_eq!(
        proxy.active_persona().await.unwrap().persona_name,
        "reviewer"
    );

    // Deactivation restores the displaced regular toolset
    proxy.call_tool("enter-configuration-mode", json!({})).await.unwrap();
    let result = proxy
        .call_tool("deactivate-persona", json!({}))
        .await
        .unwrap();
    assert_eq!(result["wasActive"], true);
    assert_eq!(result["restoredToolset"], "dev");
    assert!(proxy.active_persona().await.is_none());
    assert!(proxy.has_active_toolset().await);

    // Idempotent second deactivation
    let result = proxy
        .call_tool("deactivate-persona", json!({}))
        .await
        .unwrap();
    assert_eq!(result["wasActive"], false);
}

#[tokio::test]
async fn one_failing_server_does_not_take_down_the_rest() {
    struct BrokenServer;

    #[async_trait]
    impl TransportClient for BrokenServer {
        async fn start(&self) -> Result<()> {
            Ok(())
        }
        async fn stop(&self) -> Result<()> {
            Ok(())
        }
        async fn call(&self, _tool: &str, _args: Value) -> Result<Value> {
            Err(HubError::connection("broken"))
        }
        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
            Err(HubError::connection("broken"))
        }
        async fn ping(&self) -> bool {
            false
        }
    }

    let git = FakeServer::new(vec![("status", "Show status")]);
    let proxy = HubProxy::new(ProxyConfig::default(), Arc::new(MemoryStore::new()))
        .await
        .unwrap();
    proxy.initialize().await.unwrap();

    proxy
        .pool()
        .connect_with_client(ServerDescriptor::stdio("git", "fake", vec![]), git)
        .await
        .unwrap();
    proxy
        .pool()
        .connect_with_client(
            ServerDescriptor::stdio("broken", "fake", vec![]),
            Arc::new(BrokenServer),
        )
        .await
        .unwrap();

    let report = proxy.refresh().await;
    assert_eq!(report.succeeded, vec!["git"]);
    assert_eq!(report.failed.len(), 1);

    // The healthy server's tools are available; references to the broken
    // one simply fail to resolve
    proxy
        .call_tool(
            "build-toolset",
            json!({ "name": "dev", "tools": ["git.status"], "autoEquip": true }),
        )
        .await
        .unwrap();
    proxy.call_tool("git.status", json!({})).await.unwrap();

    proxy
        .shutdown(std::time::Duration::from_secs(5))
        .await
        .unwrap();
}

#[tokio::test]
async fn validation_rejects_bad_toolset_names_end_to_end() {
    let git = FakeServer::new(vec![("status", "Show status")]);
    let proxy = proxy_with_servers(vec![("git", git)]).await;

    let err = proxy
        .call_tool(
            "build-toolset",
            json!({ "name": "My Toolset", "tools": ["git.status"] }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");

    // Nothing persisted
    let listed = proxy.call_tool("list-toolsets", json!({})).await.unwrap();
    assert_eq!(listed["toolsets"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_reference_fails_build_with_named_culprit() {
    let git = FakeServer::new(vec![("status", "Show status")]);
    let proxy = proxy_with_servers(vec![("git", git)]).await;

    let err = proxy
        .call_tool(
            "build-toolset",
            json!({ "name": "dev", "tools": ["git.status", "git.rebase"] }),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert!(err.to_string().contains("git.rebase"));
}

#[tokio::test]
async fn explicit_refs_survive_build_and_equip() {
    let git = FakeServer::new(vec![("status", "Show status")]);
    let proxy = proxy_with_servers(vec![("git", git)]).await;

    let live_hash = proxy
        .discovery()
        .get_tool("git.status")
        .await
        .unwrap()
        .content_hash;

    proxy
        .call_tool(
            "build-toolset",
            json!({
                "name": "pinned",
                "tools": [{ "namespacedName": "git.status", "refId": live_hash }]
            }),
        )
        .await
        .unwrap();
    proxy
        .call_tool("equip-toolset", json!({ "name": "pinned" }))
        .await
        .unwrap();

    assert!(proxy.has_active_toolset().await);
}

//! Transport client adapters for downstream servers
//!
//! Every transport kind implements [`TransportClient`] identically; callers
//! construct a client through [`build_transport`] and never branch on the
//! kind again.

pub mod extension;
pub mod http;
pub mod rpc;
pub mod sse;
pub mod stdio;

use crate::config::{ServerDescriptor, TransportKind};
use async_trait::async_trait;
use hub_core::{HubError, Result, ToolDescriptor};
use serde_json::Value;

pub use rpc::{RpcError, RpcRequest, RpcResponse};

/// Uniform contract for talking to one downstream server
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Establish the session. Idempotent: a no-op if already running.
    /// Partial failures tear down whatever was started and surface a single
    /// wrapped error.
    async fn start(&self) -> Result<()>;

    /// Tear down the session. Safe to call when not running.
    async fn stop(&self) -> Result<()>;

    /// Invoke a tool by its downstream (un-namespaced) name
    async fn call(&self, tool: &str, args: Value) -> Result<Value>;

    /// Fetch the server's tool list
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Liveness probe. Never errors; internal failures resolve to `false`.
    async fn ping(&self) -> bool;
}

/// Construct the adapter matching the descriptor's transport kind
pub fn build_transport(descriptor: &ServerDescriptor) -> Result<Box<dyn TransportClient>> {
    descriptor
        .validate()
        .map_err(|e| HubError::validation(e.to_string()))?;

    match descriptor.transport {
        TransportKind::Stdio => Ok(Box::new(stdio::StdioClient::new(descriptor.clone()))),
        TransportKind::Http => Ok(Box::new(http::HttpClient::new(descriptor.clone())?)),
        TransportKind::Sse => Ok(Box::new(sse::SseClient::new(descriptor.clone())?)),
        TransportKind::Extension => Ok(Box::new(extension::ExtensionClient::new(
            descriptor.clone(),
        )?)),
    }
}

/// Extract the payload of a response, mapping rpc-level errors
pub(crate) fn expect_result(server: &str, response: RpcResponse) -> Result<Value> {
    if let Some(error) = response.error {
        return Err(HubError::connection(format!(
            "Server '{}' returned rpc error {}: {}",
            server, error.code, error.message
        )));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Parse the `tools` array of a tools/list result
pub(crate) fn parse_tool_list(server: &str, result: &Value) -> Result<Vec<ToolDescriptor>> {
    let tools = result.get("tools").ok_or_else(|| {
        HubError::connection(format!("Server '{}' returned no tools array", server))
    })?;
    serde_json::from_value(tools.clone()).map_err(|e| {
        HubError::connection(format!(
            "Server '{}' returned a malformed tool list: {}",
            server, e
        ))
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_factory_validates_descriptor() {
        let broken = ServerDescriptor::http("remote", "");
        let err = build_transport(&broken).err().unwrap();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_expect_result_maps_rpc_errors() {
        let response = RpcResponse {
            jsonrpc: "2.0".into(),
            id: json!(1),
            result: None,
            error: Some(RpcError {
                code: -32601,
                message: "method not found".into(),
                data: None,
            }),
        };
        let err = expect_result("git", response).unwrap_err();
        assert_eq!(err.kind(), "connection");
    }

    #[test]
    fn test_parse_tool_list() {
        let result = json!({
            "tools": [
                {"name": "status", "description": "Show status", "inputSchema": {"type": "object"}}
            ]
        });
        let tools = parse_tool_list("git", &result).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "status");

        assert!(parse_tool_list("git", &json!({})).is_err());
    }
}

//! SSE transport: the legacy HTTP+SSE flavor
//!
//! Requests go to the `{url}/message` endpoint; the wire payloads are
//! otherwise identical to the plain HTTP transport.

use crate::config::ServerDescriptor;
use crate::transport::http::HttpClient;
use crate::transport::TransportClient;
use async_trait::async_trait;
use hub_core::{HubError, Result, ToolDescriptor};
use serde_json::Value;

/// Client for an HTTP+SSE MCP server
pub struct SseClient {
    inner: HttpClient,
}

impl SseClient {
    pub fn new(descriptor: ServerDescriptor) -> Result<Self> {
        let base = descriptor
            .url
            .clone()
            .ok_or_else(|| HubError::validation("sse descriptor without url"))?;
        let endpoint = format!("{}/message", base.trim_end_matches('/'));

        Ok(Self {
            inner: HttpClient::with_endpoint(descriptor, endpoint)?,
        })
    }
}

#[async_trait]
impl TransportClient for SseClient {
    async fn start(&self) -> Result<()> {
        self.inner.start().await
    }

    async fn stop(&self) -> Result<()> {
        self.inner.stop().await
    }

    async fn call(&self, tool: &str, args: Value) -> Result<Value> {
        self.inner.call(tool, args).await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        self.inner.list_tools().await
    }

    async fn ping(&self) -> bool {
        self.inner.ping().await
    }
}

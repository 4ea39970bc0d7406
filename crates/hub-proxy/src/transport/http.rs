//! HTTP transport: JSON-RPC POSTed to a single endpoint

use crate::config::{ServerAuth, ServerDescriptor};
use crate::transport::rpc::{RpcRequest, RpcResponse};
use crate::transport::{expect_result, parse_tool_list, TransportClient};
use async_trait::async_trait;
use hub_core::{HubError, Result, ToolDescriptor};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Client for an HTTP-reachable MCP server
pub struct HttpClient {
    descriptor: ServerDescriptor,
    endpoint: String,
    http: reqwest::Client,
    initialized: RwLock<bool>,
}

impl HttpClient {
    pub fn new(descriptor: ServerDescriptor) -> Result<Self> {
        let endpoint = descriptor
            .url
            .clone()
            .ok_or_else(|| HubError::validation("http descriptor without url"))?;

        let http = build_http_client(&descriptor)?;

        Ok(Self {
            descriptor,
            endpoint,
            http,
            initialized: RwLock::new(false),
        })
    }

    /// Same wire behavior against a derived endpoint (used by the SSE flavor)
    pub(crate) fn with_endpoint(descriptor: ServerDescriptor, endpoint: String) -> Result<Self> {
        let http = build_http_client(&descriptor)?;
        Ok(Self {
            descriptor,
            endpoint,
            http,
            initialized: RwLock::new(false),
        })
    }

    pub(crate) fn server_name(&self) -> &str {
        &self.descriptor.name
    }

    async fn post(&self, request: &RpcRequest) -> Result<RpcResponse> {
        debug!("-> {} {}: {}", self.descriptor.name, self.endpoint, request.method);

        let response = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    HubError::timeout(format!(
                        "Server '{}' did not answer {} within {:?}",
                        self.descriptor.name,
                        request.method,
                        self.descriptor.timeout()
                    ))
                } else {
                    HubError::connection(format!(
                        "Request to server '{}' failed: {}",
                        self.descriptor.name, e
                    ))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::connection(format!(
                "Server '{}' answered HTTP {}: {}",
                self.descriptor.name, status, body
            )));
        }

        response.json().await.map_err(|e| {
            HubError::connection(format!(
                "Server '{}' sent a malformed response: {}",
                self.descriptor.name, e
            ))
        })
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let response = self.post(&RpcRequest::new(method, params)).await?;
        expect_result(&self.descriptor.name, response)
    }
}

fn build_http_client(descriptor: &ServerDescriptor) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();

    for (name, value) in &descriptor.headers {
        let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HubError::validation(format!("Invalid header name: {}", name)))?;
        let value = value
            .parse()
            .map_err(|_| HubError::validation(format!("Invalid header value for {:?}", name)))?;
        headers.insert(name, value);
    }

    if let Some(auth) = &descriptor.auth {
        match auth.resolve() {
            ServerAuth::Bearer { token } => {
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    format!("Bearer {}", token)
                        .parse()
                        .map_err(|_| HubError::validation("Invalid bearer token"))?,
                );
            }
            ServerAuth::Basic { username, password } => {
                use base64::Engine;
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    format!("Basic {}", credentials)
                        .parse()
                        .map_err(|_| HubError::validation("Invalid basic auth"))?,
                );
            }
            ServerAuth::Header { name, value } => {
                let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| HubError::validation(format!("Invalid header name: {}", name)))?;
                headers.insert(
                    name,
                    value
                        .parse()
                        .map_err(|_| HubError::validation("Invalid auth header value"))?,
                );
            }
        }
    }

    reqwest::Client::builder()
        .timeout(descriptor.timeout())
        .default_headers(headers)
        .build()
        .map_err(|e| HubError::internal(format!("Failed to build HTTP client: {}", e)))
}

#[async_trait]
impl TransportClient for HttpClient {
    async fn start(&self) -> Result<()> {
        if *self.initialized.read().await {
            return Ok(());
        }

        info!("Initializing HTTP server session: {}", self.descriptor.name);
        let response = self.post(&RpcRequest::initialize()).await?;
        expect_result(&self.descriptor.name, response)?;

        *self.initialized.write().await = true;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.initialized.write().await = false;
        Ok(())
    }

    async fn call(&self, tool: &str, args: Value) -> Result<Value> {
        self.request(
            "tools/call",
            Some(json!({ "name": tool, "arguments": args })),
        )
        .await
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let result = self.request("tools/list", Some(json!({}))).await?;
        parse_tool_list(&self.descriptor.name, &result)
    }

    async fn ping(&self) -> bool {
        match self.post(&RpcRequest::new("ping", None)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Ping failed for server '{}': {}", self.descriptor.name, e);
                false
            }
        }
    }
}

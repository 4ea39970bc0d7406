//! Stdio transport: a spawned child process speaking line-delimited JSON-RPC

use crate::config::ServerDescriptor;
use crate::transport::rpc::{RpcRequest, RpcResponse};
use crate::transport::{expect_result, parse_tool_list, TransportClient};
use async_trait::async_trait;
use hub_core::{HubError, Result, ToolDescriptor};
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct StdioSession {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Client for a locally spawned MCP server
pub struct StdioClient {
    descriptor: ServerDescriptor,
    // The session mutex both guards the pipes and serializes requests;
    // the line protocol cannot interleave concurrent exchanges.
    session: Mutex<Option<StdioSession>>,
}

impl StdioClient {
    pub fn new(descriptor: ServerDescriptor) -> Self {
        Self {
            descriptor,
            session: Mutex::new(None),
        }
    }

    fn timeout(&self) -> Duration {
        self.descriptor.timeout()
    }

    async fn spawn(&self) -> Result<StdioSession> {
        let command = self
            .descriptor
            .command
            .as_deref()
            .ok_or_else(|| HubError::validation("stdio descriptor without command"))?;

        let mut cmd = Command::new(command);
        cmd.args(&self.descriptor.args)
            .envs(&self.descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            HubError::connection(format!(
                "Failed to spawn server '{}' ({}): {}",
                self.descriptor.name, command, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HubError::connection("Failed to open child stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HubError::connection("Failed to open child stdout"))?;

        Ok(StdioSession {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    async fn exchange(&self, session: &mut StdioSession, request: &RpcRequest) -> Result<RpcResponse> {
        let payload = serde_json::to_string(request)?;
        debug!("-> {}: {}", self.descriptor.name, request.method);

        let deadline = self.timeout();
        let io = async {
            session.stdin.write_all(payload.as_bytes()).await?;
            session.stdin.write_all(b"\n").await?;
            session.stdin.flush().await?;

            let mut line = String::new();
            loop {
                line.clear();
                let read = session.stdout.read_line(&mut line).await?;
                if read == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "server closed stdout",
                    ));
                }
                if !line.trim().is_empty() {
                    return Ok(line.clone());
                }
            }
        };

        let line = tokio::time::timeout(deadline, io)
            .await
            .map_err(|_| {
                HubError::timeout(format!(
                    "Server '{}' did not answer {} within {:?}",
                    self.descriptor.name, request.method, deadline
                ))
            })?
            .map_err(|e: std::io::Error| {
                HubError::connection(format!(
                    "IO failure talking to server '{}': {}",
                    self.descriptor.name, e
                ))
            })?;

        serde_json::from_str(&line).map_err(|e| {
            HubError::connection(format!(
                "Server '{}' sent a malformed response: {}",
                self.descriptor.name, e
            ))
        })
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| HubError::connection(format!(
                "Server '{}' is not running",
                self.descriptor.name
            )))?;

        let request = RpcRequest::new(method, params);
        let response = self.exchange(session, &request).await?;
        expect_result(&self.descriptor.name, response)
    }
}

#[async_trait]
impl TransportClient for StdioClient {
    async fn start(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        info!("Starting stdio server: {}", self.descriptor.name);
        let mut session = self.spawn().await?;

        // Handshake before the session is published; a failure here must
        // leave no half-started child behind.
        let request = RpcRequest::initialize();
        match self.exchange(&mut session, &request).await {
            Ok(response) => {
                if let Err(e) = expect_result(&self.descriptor.name, response) {
                    let _ = session.child.kill().await;
                    return Err(HubError::connection(format!(
                        "Initialize rejected by server '{}': {}",
                        self.descriptor.name, e
                    )));
                }
            }
            Err(e) => {
                let _ = session.child.kill().await;
                return Err(HubError::connection(format!(
                    "Initialize failed for server '{}': {}",
                    self.descriptor.name, e
                )));
            }
        }

        *guard = Some(session);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            info!("Stopping stdio server: {}", self.descriptor.name);
            session.child.kill().await.map_err(|e| {
                HubError::connection(format!(
                    "Failed to kill server '{}': {}",
                    self.descriptor.name, e
                ))
            })?;
        }
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
        // Any well-formed reply counts: an rpc-level error still proves the
        // process is alive and serving.
        let mut guard = self.session.lock().await;
        let session = match guard.as_mut() {
            Some(session) => session,
            None => return false,
        };

        let request = RpcRequest::new("ping", None);
        match self.exchange(session, &request).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Ping failed for server '{}': {}", self.descriptor.name, e);
                false
            }
        }
    }
}

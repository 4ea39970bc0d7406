//! Extension transport: a packaged server bundle resolved to a spawned process
//!
//! A bundle is a directory containing a `manifest.json` that declares the
//! entry-point command. The manifest is validated at construction; the
//! running session is an ordinary stdio session.

use crate::config::ServerDescriptor;
use crate::transport::stdio::StdioClient;
use crate::transport::TransportClient;
use async_trait::async_trait;
use hub_core::{HubError, Result, ToolDescriptor};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Deserialize)]
struct BundleManifest {
    name: String,
    #[serde(default)]
    version: Option<String>,
    entry_point: EntryPoint,
}

#[derive(Debug, Deserialize)]
struct EntryPoint {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Client for a packaged extension bundle
pub struct ExtensionClient {
    inner: StdioClient,
}

impl ExtensionClient {
    pub fn new(descriptor: ServerDescriptor) -> Result<Self> {
        let bundle = descriptor
            .bundle
            .clone()
            .ok_or_else(|| HubError::validation("extension descriptor without bundle path"))?;

        let manifest = read_manifest(&bundle)?;
        info!(
            "Resolved extension bundle '{}' ({}) for server {}",
            manifest.name,
            manifest.version.as_deref().unwrap_or("unversioned"),
            descriptor.name
        );

        // Relative entry commands resolve inside the bundle directory.
        let command = if Path::new(&manifest.entry_point.command).is_absolute() {
            manifest.entry_point.command.clone()
        } else {
            bundle
                .join(&manifest.entry_point.command)
                .to_string_lossy()
                .into_owned()
        };

        let mut env = manifest.entry_point.env;
        // Descriptor env wins over manifest defaults
        env.extend(descriptor.env.clone());

        let mut stdio_descriptor =
            ServerDescriptor::stdio(&descriptor.name, &command, manifest.entry_point.args);
        stdio_descriptor.env = env;
        stdio_descriptor.timeout_secs = descriptor.timeout_secs;

        Ok(Self {
            inner: StdioClient::new(stdio_descriptor),
        })
    }
}

fn read_manifest(bundle: &Path) -> Result<BundleManifest> {
    let manifest_path = bundle.join(MANIFEST_FILE);
    let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
        HubError::validation(format!(
            "Cannot read extension manifest {}: {}",
            manifest_path.display(),
            e
        ))
    })?;

    let manifest: BundleManifest = serde_json::from_str(&content).map_err(|e| {
        HubError::validation(format!(
            "Malformed extension manifest {}: {}",
            manifest_path.display(),
            e
        ))
    })?;

    if manifest.entry_point.command.trim().is_empty() {
        return Err(HubError::validation(format!(
            "Extension manifest {} declares an empty entry command",
            manifest_path.display()
        )));
    }

    Ok(manifest)
}

#[async_trait]
impl TransportClient for ExtensionClient {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_manifest_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = ServerDescriptor::extension("notes", dir.path());
        let err = ExtensionClient::new(descriptor).err().unwrap();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_manifest_resolves_relative_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{
                "name": "notes",
                "version": "1.2.0",
                "entry_point": {"command": "bin/server", "args": ["--stdio"]}
            }"#,
        )
        .unwrap();

        let descriptor = ServerDescriptor::extension("notes", dir.path());
        assert!(ExtensionClient::new(descriptor).is_ok());
    }

    #[test]
    fn test_empty_entry_command_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"name": "notes", "entry_point": {"command": "  "}}"#,
        )
        .unwrap();

        let descriptor = ServerDescriptor::extension("notes", dir.path());
        assert!(ExtensionClient::new(descriptor).is_err());
    }
}

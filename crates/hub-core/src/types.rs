//! Shared data types for the hub

use crate::error::{HubError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator between server name and tool name in a namespaced tool name
pub const NAMESPACE_SEPARATOR: char = '.';

/// Raw tool definition as reported by a downstream server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: Option<&str>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.map(String::from),
            input_schema,
            annotations: None,
        }
    }
}

/// Build the namespaced name "server.tool" for a tool
pub fn namespaced(server: &str, tool: &str) -> String {
    format!("{}{}{}", server, NAMESPACE_SEPARATOR, tool)
}

/// Split a namespaced name into (server, tool)
///
/// Splits on the first separator only; downstream tool names may themselves
/// contain dots.
pub fn split_namespaced(name: &str) -> Option<(&str, &str)> {
    let idx = name.find(NAMESPACE_SEPARATOR)?;
    let (server, tool) = (&name[..idx], &name[idx + 1..]);
    if server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

/// A saved reference to a discovered tool
///
/// `ref_id` records the content hash observed when the reference was saved;
/// resolution compares it against the live hash to detect silent
/// redefinition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolReference {
    pub namespaced_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
}

impl ToolReference {
    pub fn new(namespaced_name: impl Into<String>) -> Self {
        Self {
            namespaced_name: namespaced_name.into(),
            ref_id: None,
        }
    }

    pub fn with_hash(namespaced_name: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            namespaced_name: namespaced_name.into(),
            ref_id: Some(hash.into()),
        }
    }
}

/// A named, persisted subset of the aggregate tool catalog
///
/// Persisted as a single document per name; mutated only by replacing the
/// whole document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolsetConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub tools: Vec<ToolReference>,
}

impl ToolsetConfig {
    pub fn new(name: impl Into<String>, description: Option<String>, tools: Vec<ToolReference>) -> Self {
        Self {
            name: name.into(),
            description,
            version: 1,
            created_at: Utc::now(),
            tools,
        }
    }

    /// Namespaced names of every referenced tool
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.namespaced_name.as_str()).collect()
    }

    pub fn references(&self, namespaced_name: &str) -> bool {
        self.tools.iter().any(|t| t.namespaced_name == namespaced_name)
    }
}

/// Persisted runtime record of an active persona
///
/// Captures the pre-activation state needed to restore whatever toolset was
/// active before the persona took over.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PersonaRuntimeState {
    pub persona_name: String,
    pub activation_id: String,
    pub activated_at: DateTime<Utc>,
    pub active_toolset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_toolset: Option<String>,
}

const MAX_NAME_LEN: usize = 64;

/// Validate a toolset name: lowercase letters, digits and hyphens only,
/// hyphens neither leading nor trailing.
pub fn validate_toolset_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(HubError::validation(format!(
            "Toolset name must be 1-{} characters, got {}",
            MAX_NAME_LEN,
            name.len()
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(HubError::validation(format!(
            "Toolset name '{}' must not start or end with a hyphen",
            name
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
    {
        return Err(HubError::validation(format!(
            "Toolset name '{}' contains invalid character '{}': only lowercase letters, digits and hyphens are allowed",
            name, bad
        )));
    }
    Ok(())
}

/// Validate a server name
///
/// Server names share the toolset charset plus underscore. Dots are
/// rejected because the dot separates server and tool in namespaced names.
pub fn validate_server_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(HubError::validation(format!(
            "Server name must be 1-{} characters, got {}",
            MAX_NAME_LEN,
            name.len()
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-' || *c == '_'))
    {
        return Err(HubError::validation(format!(
            "Server name '{}' contains invalid character '{}'",
            name, bad
        )));
    }
    Ok(())
}

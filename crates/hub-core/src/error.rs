//! Error taxonomy for mcp-hub

use thiserror::Error;

/// Main error type for hub operations
///
/// Every user-visible failure carries a human-readable message plus a stable
/// machine kind (see [`HubError::kind`]). Transport- and storage-library
/// errors are wrapped before they reach callers.
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Discovery failed for server '{server}': {message}")]
    Discovery { server: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Stale reference for '{name}': expected hash {expected}, live hash is {actual}")]
    StaleReference {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        HubError::Connection(msg.into())
    }

    /// Create a discovery error scoped to one server
    pub fn discovery(server: impl Into<String>, msg: impl Into<String>) -> Self {
        HubError::Discovery {
            server: server.into(),
            message: msg.into(),
        }
    }

    /// Create a tool-not-found error
    pub fn tool_not_found(msg: impl Into<String>) -> Self {
        HubError::ToolNotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        HubError::Validation(msg.into())
    }

    /// Create a routing error
    pub fn routing(msg: impl Into<String>) -> Self {
        HubError::Routing(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        HubError::Timeout(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        HubError::NotFound(msg.into())
    }

    /// Create a persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        HubError::Persistence(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        HubError::Internal(msg.into())
    }

    /// Stable machine-readable kind for this error
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::Connection(_) => "connection",
            HubError::Discovery { .. } => "discovery",
            HubError::ToolNotFound(_) => "tool-not-found",
            HubError::StaleReference { .. } => "stale-reference",
            HubError::Validation(_) => "validation",
            HubError::Routing(_) => "routing",
            HubError::Timeout(_) => "timeout",
            HubError::NotFound(_) => "not-found",
            HubError::Persistence(_) => "persistence",
            HubError::Serialization(_) => "serialization",
            HubError::Io(_) => "io",
            HubError::Internal(_) => "internal",
        }
    }

    /// Whether a caller may reasonably retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HubError::Connection(_) | HubError::Discovery { .. } | HubError::Timeout(_)
        )
    }
}

impl From<anyhow::Error> for HubError {
    fn from(err: anyhow::Error) -> Self {
        HubError::Internal(err.to_string())
    }
}

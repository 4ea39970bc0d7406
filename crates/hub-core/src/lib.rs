//! hub-core: shared types and error taxonomy for mcp-hub
//!
//! Everything in this crate is protocol-agnostic: tool descriptors as
//! reported by downstream servers, saved tool references and toolset
//! documents, the persona runtime record, and the typed error taxonomy that
//! all hub crates surface to callers.

pub mod error;
pub mod types;

pub use error::{HubError, Result};
pub use types::{
    namespaced, split_namespaced, validate_server_name, validate_toolset_name,
    PersonaRuntimeState, ToolDescriptor, ToolReference, ToolsetConfig, NAMESPACE_SEPARATOR,
};

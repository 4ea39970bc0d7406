//! hub-state-store: persisted documents for the hub
//!
//! A small key-value/document store holding toolset configurations (one
//! document per toolset name, replaced whole on every save) and the single
//! persona runtime record. SQLite-backed in production, HashMap-backed for
//! tests.

pub mod error;
pub mod memory_store;
pub mod sqlite_store;
pub mod store;

pub use error::{Result, StateStoreError};
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;
pub use store::StateStore;

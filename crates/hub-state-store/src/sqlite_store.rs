//! SQLite-backed document store
//!
//! Durable storage for toolset documents and the persona runtime record.
//! Uses SQLx for async database operations.

use crate::error::Result;
use crate::store::StateStore;
use async_trait::async_trait;
use hub_core::{PersonaRuntimeState, ToolsetConfig};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

/// SQLite-backed store for toolsets and persona runtime state
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store with the given database URL
    ///
    /// URL format: `sqlite:///path/to/db.sqlite` or `sqlite::memory:`
    pub async fn new(url: &str) -> Result<Self> {
        info!("Initializing SQLite state store: {}", url);

        // An in-memory database exists per connection, so it must be served
        // by exactly one.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        Ok(store)
    }

    /// Create an in-memory store for testing
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS toolsets (
                name TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Single-row table: the record exists only while a persona is active
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS persona_runtime (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                record TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn save_toolset(&self, config: &ToolsetConfig) -> Result<()> {
        let document = serde_json::to_string(config)?;
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO toolsets (name, document, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(name) DO UPDATE SET document = ?2, updated_at = ?3
            "#,
        )
        .bind(&config.name)
        .bind(&document)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!("Saved toolset document: {}", config.name);
        Ok(())
    }

    async fn get_toolset(&self, name: &str) -> Result<Option<ToolsetConfig>> {
        let row = sqlx::query("SELECT document FROM toolsets WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String = row.get("document");
                Ok(Some(serde_json::from_str(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn delete_toolset(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM toolsets WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_toolsets(&self) -> Result<Vec<ToolsetConfig>> {
        let rows = sqlx::query("SELECT document FROM toolsets ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        let mut toolsets = Vec::with_capacity(rows.len());
        for row in rows {
            let document: String = row.get("document");
            toolsets.push(serde_json::from_str(&document)?);
        }
        Ok(toolsets)
    }

    async fn save_persona_state(&self, state: &PersonaRuntimeState) -> Result<()> {
        let record = serde_json::to_string(state)?;
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO persona_runtime (id, record, updated_at)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET record = ?1, updated_at = ?2
            "#,
        )
        .bind(&record)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!("Saved persona runtime state: {}", state.persona_name);
        Ok(())
    }

    async fn load_persona_state(&self) -> Result<Option<PersonaRuntimeState>> {
        let row = sqlx::query("SELECT record FROM persona_runtime WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let record: String = row.get("record");
                Ok(Some(serde_json::from_str(&record)?))
            }
            None => Ok(None),
        }
    }

    async fn clear_persona_state(&self) -> Result<()> {
        sqlx::query("DELETE FROM persona_runtime WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::ToolReference;

    fn make_toolset(name: &str) -> ToolsetConfig {
        ToolsetConfig::new(
            name,
            Some("test toolset".to_string()),
            vec![ToolReference::with_hash("git.status", "abc123")],
        )
    }

    #[tokio::test]
    async fn test_toolset_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        let toolset = make_toolset("dev-tools");

        store.save_toolset(&toolset).await.unwrap();

        let loaded = store.get_toolset("dev-tools").await.unwrap().unwrap();
        assert_eq!(loaded, toolset);
        assert!(store.toolset_exists("dev-tools").await.unwrap());
        assert!(!store.toolset_exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_replaces_whole_document() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.save_toolset(&make_toolset("dev-tools")).await.unwrap();

        let mut updated = make_toolset("dev-tools");
        updated.version = 2;
        updated.tools = vec![ToolReference::new("fs.read")];
        store.save_toolset(&updated).await.unwrap();

        let loaded = store.get_toolset("dev-tools").await.unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.tools.len(), 1);
        assert_eq!(loaded.tools[0].namespaced_name, "fs.read");
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.save_toolset(&make_toolset("alpha")).await.unwrap();
        store.save_toolset(&make_toolset("beta")).await.unwrap();

        let all = store.list_toolsets().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "alpha");

        assert!(store.delete_toolset("alpha").await.unwrap());
        assert!(!store.delete_toolset("alpha").await.unwrap());
        assert_eq!(store.list_toolsets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persona_state_lifecycle() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.load_persona_state().await.unwrap().is_none());

        let state = PersonaRuntimeState {
            persona_name: "reviewer".to_string(),
            activation_id: "act-1".to_string(),
            activated_at: chrono::Utc::now(),
            active_toolset: "review".to_string(),
            previous_toolset: Some("dev-tools".to_string()),
        };
        store.save_persona_state(&state).await.unwrap();

        let loaded = store.load_persona_state().await.unwrap().unwrap();
        assert_eq!(loaded, state);

        store.clear_persona_state().await.unwrap();
        assert!(store.load_persona_state().await.unwrap().is_none());
    }
}

//! Turso Embedded / libSQL storage layer (offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database used as the host's local
//! key/value storage: one JSON document per key. The typed stores built on
//! top of it ([`TitleStore`], [`ProfileStore`], [`ArchiveStore`],
//! [`EventLog`], [`StatusStore`]) are owned by the message router's host,
//! which is the sole writer.

mod archive;
mod events;
mod migrations;
mod profile;
mod status;
mod titles;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thyself_shared::{Result, ThyselfError};

pub use archive::ArchiveStore;
pub use events::EventLog;
pub use profile::ProfileStore;
pub use status::StatusStore;
pub use titles::{TitleStore, normalize_title, title_id};

/// Storage keys, one per persisted document.
pub mod keys {
    pub const TITLES: &str = "titles_batch";
    pub const PROFILE: &str = "profile_hist";
    pub const ARCHIVE: &str = "archive_pieces";
    pub const STATUS: &str = "sync_status";
    pub const EVENTS: &str = "events";
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ThyselfError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ThyselfError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ThyselfError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ThyselfError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Raw key/value operations
    // -----------------------------------------------------------------------

    /// Read the raw JSON document stored under `key`.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv WHERE key = ?1", params![key])
            .await
            .map_err(|e| ThyselfError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| ThyselfError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(ThyselfError::Storage(e.to_string())),
        }
    }

    /// Write a raw JSON document under `key` (upserts).
    pub async fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, value, now.as_str()],
            )
            .await
            .map_err(|e| ThyselfError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete the document stored under `key`. Missing keys are not an error.
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .await
            .map_err(|e| ThyselfError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Typed JSON helpers
    // -----------------------------------------------------------------------

    /// Read and deserialize the document under `key`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key).await? {
            Some(raw) => {
                let value = serde_json::from_str(&raw).map_err(|e| {
                    ThyselfError::Storage(format!("corrupt document under '{key}': {e}"))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Serialize and write `value` under `key`.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::test_support::test_storage;

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("thyself_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn kv_set_get_remove() {
        let storage = test_storage().await;

        assert!(storage.get_raw("missing").await.expect("get").is_none());

        storage.set_raw("a", r#"{"n":1}"#).await.expect("set");
        storage.set_raw("a", r#"{"n":2}"#).await.expect("overwrite");
        assert_eq!(
            storage.get_raw("a").await.expect("get").as_deref(),
            Some(r#"{"n":2}"#)
        );

        storage.set_json("b", &vec![1, 2, 3]).await.expect("set json");
        let b: Option<Vec<u32>> = storage.get_json("b").await.expect("get json");
        assert_eq!(b, Some(vec![1, 2, 3]));

        storage.remove("a").await.expect("remove");
        storage.remove("a").await.expect("remove twice");
        assert!(storage.get_raw("a").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn corrupt_document_is_a_storage_error() {
        let storage = test_storage().await;
        storage.set_raw(keys::TITLES, "not json").await.unwrap();
        let result: Result<Option<Vec<u32>>> = storage.get_json(keys::TITLES).await;
        assert!(result.unwrap_err().to_string().contains("corrupt document"));
    }
}

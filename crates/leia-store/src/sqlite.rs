use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::kv::KeyValueStore;
use crate::schema;

/// Durable [`KeyValueStore`] in a single SQLite file.
///
/// Clones share one connection. Statements run on tokio's blocking pool
/// while holding the connection lock, so callers never block the runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open `path`, creating the file, its parent directories and the
    /// table when missing.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let store = Self::from_connection(Connection::open(path)?, path.to_path_buf())?;
        info!(path = %path.display(), "key/value store opened");
        Ok(store)
    }

    /// Store in a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self, StoreError> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Where the database lives; `:memory:` for [`Self::in_memory`].
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, job: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || job(&conn.lock())).await?
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(schema::CONNECTION_PRAGMAS)?;
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version < schema::SCHEMA_VERSION {
        debug!(from = version, to = schema::SCHEMA_VERSION, "creating key/value schema");
        conn.execute_batch(schema::V1)?;
    }
    Ok(())
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let key = key.to_owned();
        let text: Option<String> = self
            .blocking(move |conn| {
                Ok(conn
                    .query_row("SELECT json FROM entries WHERE key = ?1", [key], |row| row.get(0))
                    .optional()?)
            })
            .await?;
        Ok(text.as_deref().map(serde_json::from_str).transpose()?)
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let key = key.to_owned();
        let json = serde_json::to_string(&value)?;
        let written_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.blocking(move |conn| {
            let _ = conn.execute(
                "INSERT OR REPLACE INTO entries (key, json, written_at) VALUES (?1, ?2, ?3)",
                params![key, json, written_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_owned();
        self.blocking(move |conn| {
            let _ = conn.execute("DELETE FROM entries WHERE key = ?1", [key])?;
            Ok(())
        })
        .await
    }
}

//! Storage abstraction over two interchangeable backends.
//!
//! [`LocalStore`] exposes typed CRUD for every persisted entity and is
//! backed either by the embedded relational engine (SQLite) or by a flat
//! key-value engine (sled) when SQLite cannot be opened on the platform.
//! All call sites depend only on `LocalStore`; the backend is picked once
//! at construction by [`LocalStore::open`].

pub mod kv;
pub mod sqlite;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::db::now_ts;
use kv::KvStore;
use sqlite::SqliteStore;

/// Minimum increment applied to `updated_at` when the wall clock has not
/// advanced past the previous write of the same row.
const UPDATED_AT_EPSILON: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),

    #[error("kv store error: {0}")]
    Kv(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A persisted entity: one table (or key-value tree) per implementor.
///
/// The relational mapping hooks keep per-entity SQL next to the entity
/// definition; the key-value backend relies only on the serde impls.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;

    fn id(&self) -> Uuid;
    fn updated_at(&self) -> f64;
    fn set_updated_at(&mut self, ts: f64);

    /// Required-field checks. Failures are never retried.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// Upsert-by-id statement, parameter order matching [`Record::to_params`].
    fn upsert_sql() -> &'static str;

    /// `SELECT <columns> FROM <table>` without a WHERE clause, column order
    /// matching [`Record::from_row`].
    fn select_sql() -> &'static str;

    fn to_params(&self) -> Result<Vec<rusqlite::types::Value>, serde_json::Error>;

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

pub enum LocalStore {
    Sqlite(SqliteStore),
    Kv(KvStore),
}

impl LocalStore {
    /// Opens the relational backend, falling back to the key-value engine
    /// when SQLite is unavailable at `db_path`.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        match SqliteStore::open(&config.db_path).await {
            Ok(store) => Ok(LocalStore::Sqlite(store)),
            Err(e) => {
                warn!(
                    "sqlite backend unavailable at {} ({e}), falling back to kv store",
                    config.db_path.display()
                );
                Ok(LocalStore::Kv(KvStore::open(&config.kv_path)?))
            }
        }
    }

    pub async fn open_sqlite_in_memory() -> Result<Self, StoreError> {
        Ok(LocalStore::Sqlite(SqliteStore::open_in_memory().await?))
    }

    pub fn open_kv_temporary() -> Result<Self, StoreError> {
        Ok(LocalStore::Kv(KvStore::temporary()?))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            LocalStore::Sqlite(_) => "sqlite",
            LocalStore::Kv(_) => "kv",
        }
    }

    pub async fn get_all<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        match self {
            LocalStore::Sqlite(s) => s.get_all::<T>().await,
            LocalStore::Kv(s) => s.get_all::<T>(),
        }
    }

    pub async fn get<T: Record>(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        match self {
            LocalStore::Sqlite(s) => s.get::<T>(id).await,
            LocalStore::Kv(s) => s.get::<T>(id),
        }
    }

    /// Upserts a locally authored write: validates, then stamps `updated_at`
    /// so it strictly increases even for sub-second double writes.
    pub async fn save<T: Record>(&self, mut entity: T) -> Result<T, StoreError> {
        entity.validate().map_err(StoreError::Validation)?;

        let previous = self
            .get::<T>(entity.id())
            .await?
            .map(|e| e.updated_at())
            .unwrap_or(0.0);
        let now = now_ts();
        entity.set_updated_at(if now > previous {
            now
        } else {
            previous + UPDATED_AT_EPSILON
        });

        self.put(&entity).await?;
        Ok(entity)
    }

    /// Upserts a row replayed from the remote store, preserving the remote
    /// `updated_at` verbatim so pull watermarks stay meaningful.
    pub async fn save_replica<T: Record>(&self, entity: T) -> Result<T, StoreError> {
        entity.validate().map_err(StoreError::Validation)?;
        self.put(&entity).await?;
        Ok(entity)
    }

    pub async fn delete<T: Record>(&self, id: Uuid) -> Result<(), StoreError> {
        match self {
            LocalStore::Sqlite(s) => s.delete(T::TABLE, id).await,
            LocalStore::Kv(s) => s.delete(T::TABLE, id),
        }
    }

    /// Timestamp up to which this table's remote changes are confirmed
    /// pulled; epoch when the table has never synced.
    pub async fn watermark(&self, table: &str) -> Result<f64, StoreError> {
        match self {
            LocalStore::Sqlite(s) => s.watermark(table).await,
            LocalStore::Kv(s) => s.watermark(table),
        }
    }

    pub async fn set_watermark(&self, table: &str, ts: f64) -> Result<(), StoreError> {
        match self {
            LocalStore::Sqlite(s) => s.set_watermark(table, ts).await,
            LocalStore::Kv(s) => s.set_watermark(table, ts),
        }
    }

    async fn put<T: Record>(&self, entity: &T) -> Result<(), StoreError> {
        match self {
            LocalStore::Sqlite(s) => s.put(entity).await,
            LocalStore::Kv(s) => s.put(entity),
        }
    }
}

//! Embedded relational backend over tokio-rusqlite.
//!
//! Each call hops onto the connection's blocking thread via `conn.call`;
//! per-entity SQL comes from the [`Record`](crate::store::Record) mapping
//! hooks so this file stays entity-agnostic.

use std::path::Path;
use std::sync::Arc;

use rusqlite::params;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::db::migrations::setup_migrations;
use crate::store::{Record, StoreError};

pub struct SqliteStore {
    conn: Arc<Connection>,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;
        setup_migrations(&conn).await?;
        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        setup_migrations(&conn).await?;
        Ok(Self {
            conn: Arc::new(conn),
        })
    }

    pub(crate) async fn get_all<T: Record>(&self) -> Result<Vec<T>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(T::select_sql())?;
                let mut rows = stmt.query([])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(T::from_row(row)?);
                }
                Ok(out)
            })
            .await?;
        Ok(rows)
    }

    pub(crate) async fn get<T: Record>(&self, id: Uuid) -> Result<Option<T>, StoreError> {
        let sql = format!("{} WHERE id = ?1", T::select_sql());
        let found = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params![id.as_bytes().to_vec()])?;
                if let Some(row) = rows.next()? {
                    Ok(Some(T::from_row(row)?))
                } else {
                    Ok(None)
                }
            })
            .await?;
        Ok(found)
    }

    pub(crate) async fn put<T: Record>(&self, entity: &T) -> Result<(), StoreError> {
        let values = entity.to_params()?;
        self.conn
            .call(move |conn| {
                conn.execute(T::upsert_sql(), rusqlite::params_from_iter(values))?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub(crate) async fn delete(&self, table: &'static str, id: Uuid) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {table} WHERE id = ?1");
        self.conn
            .call(move |conn| {
                conn.execute(&sql, params![id.as_bytes().to_vec()])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub(crate) async fn watermark(&self, table: &str) -> Result<f64, StoreError> {
        let table = table.to_string();
        let ts = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT pulled_at FROM sync_state WHERE table_name = ?1")?;
                let mut rows = stmt.query(params![table])?;
                if let Some(row) = rows.next()? {
                    Ok(row.get::<_, f64>(0)?)
                } else {
                    Ok(0.0)
                }
            })
            .await?;
        Ok(ts)
    }

    pub(crate) async fn set_watermark(&self, table: &str, ts: f64) -> Result<(), StoreError> {
        let table = table.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO sync_state (table_name, pulled_at) VALUES (?1, ?2)
                       ON CONFLICT(table_name) DO UPDATE SET pulled_at = excluded.pulled_at"#,
                    params![table, ts],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

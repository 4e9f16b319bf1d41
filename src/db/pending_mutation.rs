use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{json_column, now_ts, uuid_from_blob};
use crate::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    Insert = 0,
    Update = 1,
    Delete = 2,
}

impl MutationOp {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for MutationOp {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MutationOp::Insert),
            1 => Ok(MutationOp::Update),
            2 => Ok(MutationOp::Delete),
            _ => Err(format!("invalid MutationOp value: {}", value)),
        }
    }
}

/// One local write awaiting confirmed propagation to the remote store.
/// Carries a denormalized JSON snapshot of the row rather than a foreign
/// key, so the push survives later local edits and deletes. Rows are
/// immutable once written; the v7 id makes key order match FIFO order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMutation {
    pub id: Uuid,
    pub table_name: String,
    pub operation: MutationOp,
    pub data: serde_json::Value,
    pub created_at: f64,
}

impl PendingMutation {
    pub fn new(table_name: &str, operation: MutationOp, data: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            table_name: table_name.to_string(),
            operation,
            data,
            created_at: now_ts(),
        }
    }

    /// Id of the row this mutation targets, read from the snapshot.
    pub fn target_id(&self) -> Option<Uuid> {
        self.data
            .get("id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

impl Record for PendingMutation {
    const TABLE: &'static str = "pending_mutation";

    fn id(&self) -> Uuid {
        self.id
    }

    // Queue rows are never restamped; created_at is the only timestamp.
    fn updated_at(&self) -> f64 {
        self.created_at
    }

    fn set_updated_at(&mut self, _ts: f64) {}

    fn validate(&self) -> Result<(), String> {
        if self.table_name.trim().is_empty() {
            return Err("pending mutation requires a table name".into());
        }
        Ok(())
    }

    fn upsert_sql() -> &'static str {
        r#"INSERT INTO pending_mutation (
            id, table_name, operation, data, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
            table_name = excluded.table_name,
            operation = excluded.operation,
            data = excluded.data,
            created_at = excluded.created_at"#
    }

    fn select_sql() -> &'static str {
        r#"SELECT
            id, table_name, operation, data, created_at
        FROM pending_mutation"#
    }

    fn to_params(&self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(vec![
            Value::Blob(self.id.as_bytes().to_vec()),
            Value::Text(self.table_name.clone()),
            Value::Integer(self.operation.as_i64()),
            Value::Text(serde_json::to_string(&self.data)?),
            Value::Real(self.created_at),
        ])
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let operation = MutationOp::try_from(row.get::<_, i64>(2)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Integer, e.into())
        })?;
        Ok(Self {
            id: uuid_from_blob(0, row.get(0)?)?,
            table_name: row.get(1)?,
            operation,
            data: json_column(3, &row.get::<_, String>(3)?)?,
            created_at: row.get(4)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_id_comes_from_snapshot() {
        let id = Uuid::now_v7();
        let mutation = PendingMutation::new(
            "contact",
            MutationOp::Delete,
            json!({ "id": id.to_string() }),
        );
        assert_eq!(mutation.target_id(), Some(id));

        let no_id = PendingMutation::new("contact", MutationOp::Delete, json!({}));
        assert_eq!(no_id.target_id(), None);
    }
}

// Persisted entity definitions, one file per table, plus the SQL schema
// and versioned migrations. The relational mapping for each entity lives
// next to the entity itself; backend dispatch lives in `crate::store`.

pub mod automation_rule;
pub mod campaign;
pub mod contact;
pub mod migrations;
pub mod pending_mutation;
pub mod scheduled_message;
pub mod schema;

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// Seconds since the Unix epoch as f64, the timestamp unit of every
/// `REAL` column in the schema.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub(crate) fn uuid_from_blob(idx: usize, blob: Vec<u8>) -> rusqlite::Result<Uuid> {
    Uuid::from_slice(&blob).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Blob, Box::new(e))
    })
}

pub(crate) fn json_column<T: serde::de::DeserializeOwned>(
    idx: usize,
    text: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn opt_text(value: Option<String>) -> rusqlite::types::Value {
    match value {
        Some(s) => rusqlite::types::Value::Text(s),
        None => rusqlite::types::Value::Null,
    }
}

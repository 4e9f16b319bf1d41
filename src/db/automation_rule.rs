use chrono::NaiveTime;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{now_ts, uuid_from_blob};
use crate::store::Record;

const SEND_TIME_FORMAT: &str = "%H:%M:%S";

/// Time-of-day new rules default to when the user picks none.
pub fn default_send_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default()
}

/// Closed set of trigger kinds. Only birthday-month automation exists
/// today; new variants get a new discriminant, never a reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    BirthdayMonth = 0,
}

impl TriggerType {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for TriggerType {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TriggerType::BirthdayMonth),
            _ => Err(format!("invalid TriggerType value: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    pub trigger: TriggerType,
    /// Template with `{name}`-style placeholders, substituted per contact
    /// at scheduling time.
    pub message_body: String,
    pub send_time: NaiveTime,
    pub days_offset: i64,
    pub is_active: bool,
    pub created_at: f64,
    pub updated_at: f64,
}

impl Default for AutomationRule {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            name: String::new(),
            trigger: TriggerType::BirthdayMonth,
            message_body: String::new(),
            send_time: default_send_time(),
            days_offset: 0,
            is_active: true,
            created_at: now_ts(),
            updated_at: 0.0,
        }
    }
}

impl Record for AutomationRule {
    const TABLE: &'static str = "automation_rule";

    fn id(&self) -> Uuid {
        self.id
    }

    fn updated_at(&self) -> f64 {
        self.updated_at
    }

    fn set_updated_at(&mut self, ts: f64) {
        self.updated_at = ts;
    }

    fn validate(&self) -> Result<(), String> {
        if self.id.is_nil() {
            return Err("automation rule requires an id".into());
        }
        if self.message_body.trim().is_empty() {
            return Err("automation rule requires a message body".into());
        }
        Ok(())
    }

    fn upsert_sql() -> &'static str {
        r#"INSERT INTO automation_rule (
            id, name, trigger_type, message_body, send_time,
            days_offset, is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            trigger_type = excluded.trigger_type,
            message_body = excluded.message_body,
            send_time = excluded.send_time,
            days_offset = excluded.days_offset,
            is_active = excluded.is_active,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at"#
    }

    fn select_sql() -> &'static str {
        r#"SELECT
            id, name, trigger_type, message_body, send_time,
            days_offset, is_active, created_at, updated_at
        FROM automation_rule"#
    }

    fn to_params(&self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(vec![
            Value::Blob(self.id.as_bytes().to_vec()),
            Value::Text(self.name.clone()),
            Value::Integer(self.trigger.as_i64()),
            Value::Text(self.message_body.clone()),
            Value::Text(self.send_time.format(SEND_TIME_FORMAT).to_string()),
            Value::Integer(self.days_offset),
            Value::Integer(self.is_active as i64),
            Value::Real(self.created_at),
            Value::Real(self.updated_at),
        ])
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let trigger = TriggerType::try_from(row.get::<_, i64>(2)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Integer, e.into())
        })?;
        let send_time_text: String = row.get(4)?;
        let send_time = NaiveTime::parse_from_str(&send_time_text, SEND_TIME_FORMAT)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
        Ok(Self {
            id: uuid_from_blob(0, row.get(0)?)?,
            name: row.get(1)?,
            trigger,
            message_body: row.get(3)?,
            send_time,
            days_offset: row.get(5)?,
            is_active: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

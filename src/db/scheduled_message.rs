use chrono::{DateTime, Datelike};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{now_ts, opt_text, uuid_from_blob};
use crate::store::Record;

/// Delivery state machine:
/// `pending -> processing -> {sent | pending (retry) | failed}` plus the
/// user-only `pending -> cancelled` edge. `sent`, `failed` and `cancelled`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending = 0,
    Processing = 1,
    Sent = 2,
    Failed = 3,
    Cancelled = 4,
}

impl MessageStatus {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for MessageStatus {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageStatus::Pending),
            1 => Ok(MessageStatus::Processing),
            2 => Ok(MessageStatus::Sent),
            3 => Ok(MessageStatus::Failed),
            4 => Ok(MessageStatus::Cancelled),
            _ => Err(format!("invalid MessageStatus value: {}", value)),
        }
    }
}

/// One unit of pending or completed delivery work. `message_body` is
/// already variable-substituted at scheduling time; delivery never
/// touches the template again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: Uuid,
    /// None for direct/campaign sends.
    #[serde(default)]
    pub automation_rule_id: Option<Uuid>,
    pub contact_id: Uuid,
    pub phone: String,
    pub message_body: String,
    pub scheduled_for: f64,
    pub status: MessageStatus,
    pub attempts: i64,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: f64,
    #[serde(default)]
    pub sent_at: Option<f64>,
    pub updated_at: f64,
}

impl Default for ScheduledMessage {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            automation_rule_id: None,
            contact_id: Uuid::nil(),
            phone: String::new(),
            message_body: String::new(),
            scheduled_for: 0.0,
            status: MessageStatus::Pending,
            attempts: 0,
            error_message: None,
            created_at: now_ts(),
            sent_at: None,
            updated_at: 0.0,
        }
    }
}

impl ScheduledMessage {
    /// Claims the message for one delivery attempt. Returns false when the
    /// message is not `pending`.
    pub fn claim(&mut self) -> bool {
        if self.status != MessageStatus::Pending {
            return false;
        }
        self.status = MessageStatus::Processing;
        self.attempts += 1;
        true
    }

    pub fn mark_sent(&mut self, at: f64) {
        self.status = MessageStatus::Sent;
        self.sent_at = Some(at);
        self.error_message = None;
    }

    /// Records a failed attempt: back to `pending` while under the cap,
    /// terminal `failed` once the cap is reached.
    pub fn record_failure(&mut self, error: String, max_attempts: i64) {
        self.error_message = Some(error);
        self.status = if self.attempts >= max_attempts {
            MessageStatus::Failed
        } else {
            MessageStatus::Pending
        };
    }

    /// User-initiated cancellation, only legal from `pending`.
    pub fn cancel(&mut self) -> bool {
        if self.status != MessageStatus::Pending {
            return false;
        }
        self.status = MessageStatus::Cancelled;
        true
    }

    /// Calendar year of `scheduled_for` (UTC); scopes the anti-duplicate
    /// check to one year per rule and contact.
    pub fn scheduled_year(&self) -> i32 {
        DateTime::from_timestamp(self.scheduled_for as i64, 0)
            .map(|dt| dt.year())
            .unwrap_or(0)
    }
}

impl Record for ScheduledMessage {
    const TABLE: &'static str = "scheduled_message";

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
            return Err("scheduled message requires an id".into());
        }
        if self.contact_id.is_nil() {
            return Err("scheduled message requires a contact id".into());
        }
        if self.phone.trim().is_empty() {
            return Err("scheduled message requires a phone number".into());
        }
        Ok(())
    }

    fn upsert_sql() -> &'static str {
        r#"INSERT INTO scheduled_message (
            id, automation_rule_id, contact_id, phone, message_body,
            scheduled_for, status, attempts, error_message,
            created_at, sent_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(id) DO UPDATE SET
            automation_rule_id = excluded.automation_rule_id,
            contact_id = excluded.contact_id,
            phone = excluded.phone,
            message_body = excluded.message_body,
            scheduled_for = excluded.scheduled_for,
            status = excluded.status,
            attempts = excluded.attempts,
            error_message = excluded.error_message,
            created_at = excluded.created_at,
            sent_at = excluded.sent_at,
            updated_at = excluded.updated_at"#
    }

    fn select_sql() -> &'static str {
        r#"SELECT
            id, automation_rule_id, contact_id, phone, message_body,
            scheduled_for, status, attempts, error_message,
            created_at, sent_at, updated_at
        FROM scheduled_message"#
    }

    fn to_params(&self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(vec![
            Value::Blob(self.id.as_bytes().to_vec()),
            match self.automation_rule_id {
                Some(rule_id) => Value::Blob(rule_id.as_bytes().to_vec()),
                None => Value::Null,
            },
            Value::Blob(self.contact_id.as_bytes().to_vec()),
            Value::Text(self.phone.clone()),
            Value::Text(self.message_body.clone()),
            Value::Real(self.scheduled_for),
            Value::Integer(self.status.as_i64()),
            Value::Integer(self.attempts),
            opt_text(self.error_message.clone()),
            Value::Real(self.created_at),
            match self.sent_at {
                Some(ts) => Value::Real(ts),
                None => Value::Null,
            },
            Value::Real(self.updated_at),
        ])
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let automation_rule_id = match row.get::<_, Option<Vec<u8>>>(1)? {
            Some(blob) => Some(uuid_from_blob(1, blob)?),
            None => None,
        };
        let status = MessageStatus::try_from(row.get::<_, i64>(6)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Integer, e.into())
        })?;
        Ok(Self {
            id: uuid_from_blob(0, row.get(0)?)?,
            automation_rule_id,
            contact_id: uuid_from_blob(2, row.get(2)?)?,
            phone: row.get(3)?,
            message_body: row.get(4)?,
            scheduled_for: row.get(5)?,
            status,
            attempts: row.get(7)?,
            error_message: row.get(8)?,
            created_at: row.get(9)?,
            sent_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> ScheduledMessage {
        ScheduledMessage {
            contact_id: Uuid::now_v7(),
            phone: "+15550001111".into(),
            message_body: "hello".into(),
            ..ScheduledMessage::default()
        }
    }

    #[test]
    fn test_claim_only_from_pending() {
        let mut msg = message();
        assert!(msg.claim());
        assert_eq!(msg.status, MessageStatus::Processing);
        assert_eq!(msg.attempts, 1);

        // Already processing: a second claim is refused.
        assert!(!msg.claim());
        assert_eq!(msg.attempts, 1);
    }

    #[test]
    fn test_failure_reverts_to_pending_under_cap() {
        let mut msg = message();
        msg.claim();
        msg.record_failure("timeout".into(), 3);
        assert_eq!(msg.status, MessageStatus::Pending);
        assert_eq!(msg.error_message.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_failure_at_cap_is_terminal() {
        let mut msg = message();
        for _ in 0..3 {
            assert!(msg.claim());
            msg.record_failure("unreachable".into(), 3);
        }
        assert_eq!(msg.status, MessageStatus::Failed);
        assert_eq!(msg.attempts, 3);
        assert!(msg.error_message.is_some());

        // Terminal: no further claims.
        assert!(!msg.claim());
    }

    #[test]
    fn test_cancel_only_from_pending() {
        let mut msg = message();
        assert!(msg.cancel());
        assert_eq!(msg.status, MessageStatus::Cancelled);

        let mut sent = message();
        sent.claim();
        sent.mark_sent(now_ts());
        assert!(!sent.cancel());
        assert_eq!(sent.status, MessageStatus::Sent);
    }

    #[test]
    fn test_sent_clears_error() {
        let mut msg = message();
        msg.claim();
        msg.record_failure("blip".into(), 3);
        msg.claim();
        msg.mark_sent(now_ts());
        assert_eq!(msg.status, MessageStatus::Sent);
        assert!(msg.error_message.is_none());
        assert!(msg.sent_at.is_some());
    }
}

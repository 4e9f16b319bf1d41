use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::contact::Contact;
use crate::db::{json_column, now_ts, opt_text, uuid_from_blob};
use crate::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft = 0,
    Sending = 1,
    Sent = 2,
    Failed = 3,
}

impl CampaignStatus {
    pub fn as_i64(self) -> i64 {
        self as i64
    }
}

impl TryFrom<i64> for CampaignStatus {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CampaignStatus::Draft),
            1 => Ok(CampaignStatus::Sending),
            2 => Ok(CampaignStatus::Sent),
            3 => Ok(CampaignStatus::Failed),
            _ => Err(format!("invalid CampaignStatus value: {}", value)),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid campaign transition: {from:?} -> {to:?}")]
pub struct CampaignStateError {
    pub from: CampaignStatus,
    pub to: CampaignStatus,
}

/// Structured audience predicate over Contact fields, stored as one JSON
/// column. Listed interests must all be present on the contact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignFilter {
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub birthday_month: Option<u32>,
    #[serde(default)]
    pub include_blocked: bool,
}

impl CampaignFilter {
    pub fn matches(&self, contact: &Contact) -> bool {
        if contact.is_blocked && !self.include_blocked {
            return false;
        }
        if let Some(month) = self.birthday_month {
            match &contact.birthday {
                Some(b) if b.month == month => {}
                _ => return false,
            }
        }
        self.interests
            .iter()
            .all(|i| contact.interests.iter().any(|have| have == i))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub filter: CampaignFilter,
    pub message_body: String,
    #[serde(default)]
    pub media_asset_id: Option<String>,
    pub created_at: f64,
    pub updated_at: f64,
}

impl Default for Campaign {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            name: String::new(),
            status: CampaignStatus::Draft,
            filter: CampaignFilter::default(),
            message_body: String::new(),
            media_asset_id: None,
            created_at: now_ts(),
            updated_at: 0.0,
        }
    }
}

impl Campaign {
    fn transition(&mut self, from: CampaignStatus, to: CampaignStatus) -> Result<(), CampaignStateError> {
        if self.status != from {
            return Err(CampaignStateError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `draft -> sending`, the launch step.
    pub fn begin_sending(&mut self) -> Result<(), CampaignStateError> {
        self.transition(CampaignStatus::Draft, CampaignStatus::Sending)
    }

    /// `sending -> sent`, terminal.
    pub fn complete(&mut self) -> Result<(), CampaignStateError> {
        self.transition(CampaignStatus::Sending, CampaignStatus::Sent)
    }

    /// `sending -> failed`, terminal.
    pub fn fail(&mut self) -> Result<(), CampaignStateError> {
        self.transition(CampaignStatus::Sending, CampaignStatus::Failed)
    }
}

impl Record for Campaign {
    const TABLE: &'static str = "campaign";

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
            return Err("campaign requires an id".into());
        }
        if self.name.trim().is_empty() {
            return Err("campaign requires a name".into());
        }
        Ok(())
    }

    fn upsert_sql() -> &'static str {
        r#"INSERT INTO campaign (
            id, name, status, filter, message_body,
            media_asset_id, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            status = excluded.status,
            filter = excluded.filter,
            message_body = excluded.message_body,
            media_asset_id = excluded.media_asset_id,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at"#
    }

    fn select_sql() -> &'static str {
        r#"SELECT
            id, name, status, filter, message_body,
            media_asset_id, created_at, updated_at
        FROM campaign"#
    }

    fn to_params(&self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(vec![
            Value::Blob(self.id.as_bytes().to_vec()),
            Value::Text(self.name.clone()),
            Value::Integer(self.status.as_i64()),
            Value::Text(serde_json::to_string(&self.filter)?),
            Value::Text(self.message_body.clone()),
            opt_text(self.media_asset_id.clone()),
            Value::Real(self.created_at),
            Value::Real(self.updated_at),
        ])
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let status = CampaignStatus::try_from(row.get::<_, i64>(2)?).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Integer,
                e.into(),
            )
        })?;
        Ok(Self {
            id: uuid_from_blob(0, row.get(0)?)?,
            name: row.get(1)?,
            status,
            filter: json_column(3, &row.get::<_, String>(3)?)?,
            message_body: row.get(4)?,
            media_asset_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contact::Birthday;

    #[test]
    fn test_lifecycle_transitions() {
        let mut campaign = Campaign {
            name: "Spring promo".into(),
            ..Campaign::default()
        };
        campaign.begin_sending().expect("draft -> sending");
        campaign.complete().expect("sending -> sent");

        // Terminal states refuse further transitions.
        assert!(campaign.begin_sending().is_err());
        assert!(campaign.fail().is_err());
    }

    #[test]
    fn test_launch_requires_draft() {
        let mut campaign = Campaign {
            name: "Promo".into(),
            status: CampaignStatus::Failed,
            ..Campaign::default()
        };
        assert!(campaign.begin_sending().is_err());
    }

    #[test]
    fn test_filter_matching() {
        let contact = Contact {
            name: "Filtered".into(),
            interests: vec!["vip".into(), "gold".into()],
            birthday: Some(Birthday {
                month: 3,
                day: 10,
                year: None,
            }),
            ..Contact::default()
        };

        let all = CampaignFilter::default();
        assert!(all.matches(&contact));

        let by_interest = CampaignFilter {
            interests: vec!["vip".into()],
            ..CampaignFilter::default()
        };
        assert!(by_interest.matches(&contact));

        let missing_interest = CampaignFilter {
            interests: vec!["vip".into(), "silver".into()],
            ..CampaignFilter::default()
        };
        assert!(!missing_interest.matches(&contact));

        let wrong_month = CampaignFilter {
            birthday_month: Some(4),
            ..CampaignFilter::default()
        };
        assert!(!wrong_month.matches(&contact));

        let blocked = Contact {
            is_blocked: true,
            ..contact.clone()
        };
        assert!(!all.matches(&blocked));
        let include_blocked = CampaignFilter {
            include_blocked: true,
            ..CampaignFilter::default()
        };
        assert!(include_blocked.matches(&blocked));
    }
}

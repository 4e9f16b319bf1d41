use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{json_column, now_ts, opt_text, uuid_from_blob};
use crate::store::Record;

/// Calendar birthday; year is optional because most address books only
/// carry month and day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Birthday {
    pub month: u32,
    pub day: u32,
    #[serde(default)]
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birthday: Option<Birthday>,
    #[serde(default)]
    pub interests: Vec<String>,
    /// Soft visibility flag; blocked contacts are skipped by automation
    /// but never deleted.
    #[serde(default)]
    pub is_blocked: bool,
    pub created_at: f64,
    pub updated_at: f64,
}

impl Default for Contact {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            name: String::new(),
            phone: None,
            email: None,
            birthday: None,
            interests: Vec::new(),
            is_blocked: false,
            created_at: now_ts(),
            updated_at: 0.0,
        }
    }
}

impl Contact {
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }
}

impl Record for Contact {
    const TABLE: &'static str = "contact";

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
            return Err("contact requires an id".into());
        }
        if self.name.trim().is_empty() {
            return Err("contact requires a name".into());
        }
        Ok(())
    }

    fn upsert_sql() -> &'static str {
        r#"INSERT INTO contact (
            id, name, phone, email, birthday, interests,
            is_blocked, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            phone = excluded.phone,
            email = excluded.email,
            birthday = excluded.birthday,
            interests = excluded.interests,
            is_blocked = excluded.is_blocked,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at"#
    }

    fn select_sql() -> &'static str {
        r#"SELECT
            id, name, phone, email, birthday, interests,
            is_blocked, created_at, updated_at
        FROM contact"#
    }

    fn to_params(&self) -> Result<Vec<Value>, serde_json::Error> {
        Ok(vec![
            Value::Blob(self.id.as_bytes().to_vec()),
            Value::Text(self.name.clone()),
            opt_text(self.phone.clone()),
            opt_text(self.email.clone()),
            match &self.birthday {
                Some(b) => Value::Text(serde_json::to_string(b)?),
                None => Value::Null,
            },
            Value::Text(serde_json::to_string(&self.interests)?),
            Value::Integer(self.is_blocked as i64),
            Value::Real(self.created_at),
            Value::Real(self.updated_at),
        ])
    }

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let birthday = match row.get::<_, Option<String>>(4)? {
            Some(text) => Some(json_column(4, &text)?),
            None => None,
        };
        Ok(Self {
            id: uuid_from_blob(0, row.get(0)?)?,
            name: row.get(1)?,
            phone: row.get(2)?,
            email: row.get(3)?,
            birthday,
            interests: json_column(5, &row.get::<_, String>(5)?)?,
            is_blocked: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_name_is_leading_token() {
        let contact = Contact {
            name: "Ada Lovelace".into(),
            ..Contact::default()
        };
        assert_eq!(contact.first_name(), "Ada");

        let mononym = Contact {
            name: "Cher".into(),
            ..Contact::default()
        };
        assert_eq!(mononym.first_name(), "Cher");
    }

    #[test]
    fn test_validation_requires_name() {
        let contact = Contact::default();
        assert!(contact.validate().is_err());

        let named = Contact {
            name: "Someone".into(),
            ..Contact::default()
        };
        assert!(named.validate().is_ok());
    }

    #[test]
    fn test_birthday_json_roundtrip() {
        let birthday = Birthday {
            month: 2,
            day: 29,
            year: None,
        };
        let json = serde_json::to_string(&birthday).expect("serialize");
        let back: Birthday = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, birthday);
    }
}

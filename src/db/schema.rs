pub const SCHEMA_V1: &str = r#"
BEGIN;

-- Contact:
CREATE TABLE
    IF NOT EXISTS contact (
        id BLOB PRIMARY KEY CHECK (length (id) = 16),
        name TEXT NOT NULL,
        phone TEXT,
        email TEXT,
        birthday TEXT CHECK (
            birthday IS NULL
            OR json_valid (birthday)
        ),
        interests TEXT NOT NULL CHECK (json_valid (interests)),
        is_blocked INTEGER NOT NULL DEFAULT 0,
        created_at REAL NOT NULL,
        updated_at REAL NOT NULL
    );

-- Campaign:
CREATE TABLE
    IF NOT EXISTS campaign (
        id BLOB PRIMARY KEY CHECK (length (id) = 16),
        name TEXT NOT NULL,
        status INTEGER NOT NULL,
        filter TEXT NOT NULL CHECK (json_valid (filter)),
        message_body TEXT NOT NULL,
        media_asset_id TEXT,
        created_at REAL NOT NULL,
        updated_at REAL NOT NULL
    );

-- AutomationRule:
CREATE TABLE
    IF NOT EXISTS automation_rule (
        id BLOB PRIMARY KEY CHECK (length (id) = 16),
        name TEXT NOT NULL,
        trigger_type INTEGER NOT NULL,
        message_body TEXT NOT NULL,
        send_time TEXT NOT NULL,
        days_offset INTEGER NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at REAL NOT NULL,
        updated_at REAL NOT NULL
    );

-- ScheduledMessage:
CREATE TABLE
    IF NOT EXISTS scheduled_message (
        id BLOB PRIMARY KEY CHECK (length (id) = 16),
        automation_rule_id BLOB CHECK (
            automation_rule_id IS NULL
            OR length (automation_rule_id) = 16
        ),
        contact_id BLOB NOT NULL CHECK (length (contact_id) = 16),
        phone TEXT NOT NULL,
        message_body TEXT NOT NULL,
        scheduled_for REAL NOT NULL,
        status INTEGER NOT NULL DEFAULT 0,
        attempts INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at REAL NOT NULL,
        sent_at REAL,
        updated_at REAL NOT NULL
    );

-- PendingMutation (offline write queue, FIFO by created_at):
CREATE TABLE
    IF NOT EXISTS pending_mutation (
        id BLOB PRIMARY KEY CHECK (length (id) = 16),
        table_name TEXT NOT NULL,
        operation INTEGER NOT NULL,
        data TEXT NOT NULL CHECK (json_valid (data)),
        created_at REAL NOT NULL
    );

-- Per-table pull watermarks:
CREATE TABLE
    IF NOT EXISTS sync_state (
        table_name TEXT PRIMARY KEY,
        pulled_at REAL NOT NULL
    );

PRAGMA user_version = 1;

COMMIT;
"#;

//! SQL DDL for initializing the database schema.

/// SQLite schema includes:
/// - `email_connections` (one OAuth grant per (user, provider, mailbox))
/// - `contacts` / `leads` (CRM records the matcher resolves addresses against)
/// - `activities` (CRM interactions; synced rows carry provider ids)
/// - `processed_events` (idempotency ledger)
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Mailbox connections
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS email_connections (
    id INTEGER PRIMARY KEY NOT NULL,
    user_id TEXT NOT NULL,
    provider TEXT NOT NULL,
    email_address TEXT NOT NULL,
    access_token TEXT NOT NULL,
    refresh_token TEXT NULL,
    token_expiry TEXT NULL, -- RFC3339
    scope TEXT NULL,
    webhook_subscription_id TEXT NULL,
    webhook_expiry TEXT NULL, -- RFC3339
    is_active INTEGER NOT NULL DEFAULT 1,
    last_sync_at TEXT NULL, -- RFC3339
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL, -- RFC3339
    UNIQUE(user_id, provider, email_address)
);

CREATE INDEX IF NOT EXISTS idx_email_connections_user ON email_connections(user_id);
CREATE INDEX IF NOT EXISTS idx_email_connections_subscription
    ON email_connections(webhook_subscription_id);

-- ---------------------------------------------------------------------------
-- CRM records
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY NOT NULL,
    first_name TEXT NULL,
    last_name TEXT NULL,
    email TEXT NULL,
    account_id INTEGER NULL
);

CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts(email);

CREATE TABLE IF NOT EXISTS leads (
    id INTEGER PRIMARY KEY NOT NULL,
    first_name TEXT NULL,
    last_name TEXT NULL,
    email TEXT NULL,
    company TEXT NULL
);

CREATE INDEX IF NOT EXISTS idx_leads_email ON leads(email);

-- ---------------------------------------------------------------------------
-- Activities
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS activities (
    id INTEGER PRIMARY KEY NOT NULL,
    type TEXT NOT NULL,
    subject TEXT NOT NULL,
    notes TEXT NULL,
    activity_date TEXT NOT NULL, -- RFC3339
    duration_minutes INTEGER NULL,
    contact_id INTEGER NULL,
    lead_id INTEGER NULL,
    account_id INTEGER NULL,
    user_id TEXT NOT NULL,
    email_message_id TEXT NULL,
    email_thread_id TEXT NULL,
    email_provider TEXT NULL,
    email_from TEXT NULL,
    email_to TEXT NULL,
    email_body TEXT NULL,
    email_html_body TEXT NULL,
    is_inbound INTEGER NULL,
    external_event_id TEXT NULL,
    location TEXT NULL,
    created_at TEXT NOT NULL -- RFC3339
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_activities_email_message
    ON activities(email_provider, email_message_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_activities_external_event
    ON activities(email_provider, external_event_id);
CREATE INDEX IF NOT EXISTS idx_activities_user ON activities(user_id);

-- ---------------------------------------------------------------------------
-- Idempotency ledger
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS processed_events (
    id INTEGER PRIMARY KEY NOT NULL,
    event_type TEXT NOT NULL,
    event_key TEXT NOT NULL,
    metadata TEXT NULL, -- JSON
    processed_at TEXT NOT NULL, -- RFC3339
    UNIQUE(event_type, event_key)
);

CREATE INDEX IF NOT EXISTS idx_processed_events_processed_at
    ON processed_events(processed_at);
"#;

use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA mmap_size = 268435456;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS entities (
    entity_id BLOB PRIMARY KEY CHECK (length(entity_id) = 16),
    schema_key TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entities_schema ON entities (schema_key);

CREATE TABLE IF NOT EXISTS fields (
    entity_id BLOB NOT NULL CHECK (length(entity_id) = 16),
    field_key TEXT NOT NULL,
    value BLOB NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (entity_id, field_key)
);

CREATE TABLE IF NOT EXISTS attachments (
    attachment_id BLOB PRIMARY KEY CHECK (length(attachment_id) = 16),
    mime_type TEXT NOT NULL DEFAULT '',
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS terms (
    term_id BLOB PRIMARY KEY CHECK (length(term_id) = 16),
    taxonomy TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_terms_taxonomy ON terms (taxonomy);

CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY CHECK (length(user_id) = 16),
    display_name TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS backups (
    backup_id BLOB PRIMARY KEY CHECK (length(backup_id) = 16),
    target_entity_id BLOB NOT NULL CHECK (length(target_entity_id) = 16),
    actor_id BLOB NOT NULL CHECK (length(actor_id) = 16),
    created_at INTEGER NOT NULL,
    checksum BLOB NOT NULL CHECK (length(checksum) = 32),
    snapshot BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_backups_target ON backups (target_entity_id, created_at);
CREATE INDEX IF NOT EXISTS idx_backups_created ON backups (created_at);
";

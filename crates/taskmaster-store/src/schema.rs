use rusqlite::{Connection, params};

use crate::Result;

/// Version written by [`initialize`].
pub const SCHEMA_VERSION: i32 = 1;

/// Creates all tables and indexes if they don't exist yet.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS model_versions (
            id TEXT PRIMARY KEY,
            model_name TEXT NOT NULL,
            version TEXT NOT NULL,
            config TEXT NOT NULL DEFAULT '{}',
            metrics TEXT NOT NULL DEFAULT '{}',
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            UNIQUE (model_name, version)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_model_versions_one_active
        ON model_versions(model_name) WHERE is_active = 1;

        CREATE TABLE IF NOT EXISTS inference_logs (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL CHECK (length(user_id) > 0),
            task_id TEXT,
            model_version_id TEXT REFERENCES model_versions(id) ON DELETE SET NULL,
            model_name TEXT,
            endpoint TEXT NOT NULL,
            input_text TEXT NOT NULL,
            output TEXT NOT NULL,
            latency_ms INTEGER NOT NULL CHECK (latency_ms >= 0),
            confidence REAL CHECK (confidence IS NULL OR (confidence >= 0.0 AND confidence <= 1.0)),
            user_accepted INTEGER,
            user_feedback TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_inference_logs_user
        ON inference_logs(user_id, created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_inference_logs_task
        ON inference_logs(task_id);

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
        ",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        params![SCHEMA_VERSION],
    )?;
    Ok(())
}

/// Highest schema version applied to the database.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let version: i32 =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(version)
}

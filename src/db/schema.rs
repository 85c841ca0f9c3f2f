// src/db/schema.rs
// Broker schema, applied idempotently at pool creation

use rusqlite::Connection;

/// Full broker schema. Every statement is IF NOT EXISTS so the batch can
/// run on every startup.
pub const SCHEMA: &str = r#"
-- ═══════════════════════════════════════
-- AGENTS: registry of managed-host agents
-- ═══════════════════════════════════════
CREATE TABLE IF NOT EXISTS agents (
    id INTEGER PRIMARY KEY,
    agent_id TEXT UNIQUE NOT NULL,
    hostname TEXT,
    status TEXT NOT NULL DEFAULT 'online',
    registered_at TEXT DEFAULT CURRENT_TIMESTAMP,
    last_seen TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_agents_last_seen ON agents(status, last_seen);

-- ═══════════════════════════════════════
-- MESSAGE QUEUE: durable outbound/inbound mailbox
-- ═══════════════════════════════════════
CREATE TABLE IF NOT EXISTS message_queue (
    id INTEGER PRIMARY KEY,
    message_id TEXT UNIQUE NOT NULL,
    correlation_id TEXT,
    agent_id TEXT NOT NULL,
    direction TEXT NOT NULL,
    message_type TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'pending',
    priority INTEGER NOT NULL DEFAULT 2,
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 5,
    next_attempt_at TEXT,
    lease_expires_at TEXT,
    expires_at TEXT,
    last_error TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
    delivered_at TEXT,
    acknowledged_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_queue_mailbox ON message_queue(agent_id, direction, status);
CREATE INDEX IF NOT EXISTS idx_queue_dispatch ON message_queue(status, next_attempt_at);
CREATE INDEX IF NOT EXISTS idx_queue_correlation ON message_queue(correlation_id);
CREATE INDEX IF NOT EXISTS idx_queue_retention ON message_queue(status, updated_at);
"#;

/// Apply the schema (idempotent). Called during pool creation.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_applies_twice() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        run_migrations(&conn).expect("first apply");
        run_migrations(&conn).expect("second apply is a no-op");

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('agents', 'message_queue')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }
}

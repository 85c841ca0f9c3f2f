//! Data retention — periodic purge of terminal messages.
//!
//! Acknowledged, expired and dead messages stay queryable for a
//! configurable window (`[retention]` in config.toml, default 30 days),
//! then get deleted in batches so the write lock is never held across a
//! large backlog. Non-terminal rows are never touched here; a stuck
//! pending message is a dispatch problem, not a retention one.

use rusqlite::Connection;

/// Batch size for retention deletes. The subquery-with-LIMIT form works
/// without SQLITE_ENABLE_UPDATE_DELETE_LIMIT.
const PURGE_BATCH: usize = 10_000;

/// Delete terminal messages older than `days`. Returns total deleted rows.
pub fn purge_terminal_sync(conn: &Connection, days: u32) -> rusqlite::Result<usize> {
    // Safety guard: days=0 would delete every terminal row immediately,
    // including responses a caller may still take. Enforce a minimum of 1.
    if days == 0 {
        tracing::warn!("[retention] Skipping purge: days=0 would wipe terminal history. Set days >= 1.");
        return Ok(0);
    }

    let sql = format!(
        "DELETE FROM message_queue WHERE rowid IN \
         (SELECT rowid FROM message_queue \
          WHERE status IN ('acknowledged', 'expired', 'dead') \
            AND updated_at < datetime('now', '-{days} days') \
          LIMIT {PURGE_BATCH})"
    );

    let mut total_deleted = 0;
    loop {
        match conn.execute(&sql, []) {
            Ok(0) => break,
            Ok(count) => {
                total_deleted += count;
                tracing::info!(
                    "[retention] Deleted {} terminal messages (>{} days old, batch)",
                    count,
                    days
                );
                if count < PURGE_BATCH {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!("[retention] Purge batch failed: {}", e);
                return Err(e);
            }
        }
    }

    Ok(total_deleted)
}

/// Dry-run: count how many messages a purge would delete.
pub fn count_purge_candidates(conn: &Connection, days: u32) -> rusqlite::Result<usize> {
    if days == 0 {
        return Ok(0);
    }
    conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM message_queue \
             WHERE status IN ('acknowledged', 'expired', 'dead') \
               AND updated_at < datetime('now', '-{days} days')"
        ),
        [],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::run_migrations(&conn).unwrap();
        conn
    }

    fn insert_message(conn: &Connection, message_id: &str, status: &str, age_days: i64) {
        conn.execute(
            "INSERT INTO message_queue \
                 (message_id, agent_id, direction, message_type, payload, status, updated_at) \
             VALUES (?1, 'agent-1', 'outbound', 'run_script', '{}', ?2, \
                     datetime('now', '-' || ?3 || ' days'))",
            rusqlite::params![message_id, status, age_days],
        )
        .unwrap();
    }

    #[test]
    fn test_purge_empty_table() {
        let conn = setup_conn();
        let deleted = purge_terminal_sync(&conn, 30).unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn test_purge_deletes_old_terminal_rows() {
        let conn = setup_conn();
        insert_message(&conn, "m-old-ack", "acknowledged", 60);
        insert_message(&conn, "m-old-dead", "dead", 60);
        insert_message(&conn, "m-old-expired", "expired", 60);

        let deleted = purge_terminal_sync(&conn, 30).unwrap();
        assert_eq!(deleted, 3);

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM message_queue", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_purge_preserves_recent_and_active_rows() {
        let conn = setup_conn();
        insert_message(&conn, "m-recent-ack", "acknowledged", 1);
        insert_message(&conn, "m-old-pending", "pending", 60);
        insert_message(&conn, "m-old-leased", "leased", 60);

        let deleted = purge_terminal_sync(&conn, 30).unwrap();
        assert_eq!(deleted, 0, "recent terminal and old active rows must survive");

        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM message_queue", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 3);
    }

    #[test]
    fn test_purge_zero_days_is_refused() {
        let conn = setup_conn();
        insert_message(&conn, "m-ack", "acknowledged", 60);

        let deleted = purge_terminal_sync(&conn, 0).unwrap();
        assert_eq!(deleted, 0, "days=0 must not delete anything");
    }

    #[test]
    fn test_count_purge_candidates() {
        let conn = setup_conn();
        insert_message(&conn, "m-old", "acknowledged", 60);
        insert_message(&conn, "m-new", "acknowledged", 1);

        assert_eq!(count_purge_candidates(&conn, 30).unwrap(), 1);
        assert_eq!(count_purge_candidates(&conn, 0).unwrap(), 0);
    }
}

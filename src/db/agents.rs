// src/db/agents.rs
// Agent registry: registration, heartbeats, stale detection

use rusqlite::{Connection, OptionalExtension, params};
use std::str::FromStr;

use super::log_and_discard;
use super::types::{AgentRecord, AgentStatus};

/// Parse AgentRecord from a rusqlite Row with standard column order:
/// (id, agent_id, hostname, status, registered_at, last_seen)
pub fn parse_agent_row(row: &rusqlite::Row) -> rusqlite::Result<AgentRecord> {
    let status_raw: String = row.get(3)?;
    let status = AgentStatus::from_str(&status_raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(AgentRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        hostname: row.get(2)?,
        status,
        registered_at: row.get(4)?,
        last_seen: row.get(5)?,
    })
}

/// Register an agent, or refresh an existing registration.
///
/// Re-registration updates the hostname (machines get renamed) and flips
/// the agent back online.
pub fn register_agent_sync(
    conn: &Connection,
    agent_id: &str,
    hostname: Option<&str>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO agents (agent_id, hostname, status, registered_at, last_seen) \
         VALUES (?1, ?2, 'online', datetime('now'), datetime('now')) \
         ON CONFLICT(agent_id) DO UPDATE SET \
             hostname = COALESCE(excluded.hostname, hostname), \
             status = 'online', \
             last_seen = datetime('now')",
        params![agent_id, hostname],
    )?;

    conn.query_row(
        "SELECT id FROM agents WHERE agent_id = ?",
        [agent_id],
        |row| row.get(0),
    )
}

/// Bump last_seen. Returns false for agents that never registered.
pub fn heartbeat_sync(conn: &Connection, agent_id: &str) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE agents SET last_seen = datetime('now'), status = 'online' WHERE agent_id = ?",
        [agent_id],
    )?;
    Ok(updated > 0)
}

/// Flip agents that stopped polling to offline. Returns how many flipped.
pub fn mark_stale_agents_offline_sync(
    conn: &Connection,
    idle_secs: u64,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE agents SET status = 'offline' \
         WHERE status = 'online' \
           AND last_seen <= datetime('now', '-' || ?1 || ' seconds')",
        [idle_secs as i64],
    )
}

/// Look up a single agent.
pub fn get_agent_sync(conn: &Connection, agent_id: &str) -> rusqlite::Result<Option<AgentRecord>> {
    conn.query_row(
        "SELECT id, agent_id, hostname, status, registered_at, last_seen \
         FROM agents WHERE agent_id = ?",
        [agent_id],
        parse_agent_row,
    )
    .optional()
}

/// All registered agents, most recently seen first.
pub fn list_agents_sync(conn: &Connection) -> rusqlite::Result<Vec<AgentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, agent_id, hostname, status, registered_at, last_seen \
         FROM agents ORDER BY last_seen DESC, agent_id ASC",
    )?;
    let rows = stmt.query_map([], parse_agent_row)?;
    Ok(rows.filter_map(log_and_discard).collect())
}

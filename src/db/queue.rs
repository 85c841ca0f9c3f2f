// src/db/queue.rs
// Message queue operations: enqueue, lease, acknowledge, retry, expire.
//
// All functions are synchronous and run on pooled connections via
// pool.interact_raw()/run(). Eligibility comparisons happen in SQL against
// datetime('now') so clock handling stays in one place.

use rusqlite::{Connection, OptionalExtension, params};
use std::str::FromStr;

use super::log_and_discard;
use super::types::{
    AgentBacklog, Direction, MessagePriority, MessageStatus, NackOutcome, NewMessage,
    QueueStats, QueuedMessage,
};
use crate::queue::backoff::BackoffPolicy;

/// Standard column order for message_queue selects; parse_message_row
/// depends on it.
const MESSAGE_COLS: &str = "id, message_id, correlation_id, agent_id, direction, message_type, \
     payload, status, priority, attempts, max_attempts, next_attempt_at, lease_expires_at, \
     expires_at, last_error, created_at, updated_at, delivered_at, acknowledged_at";

/// Parse a stored enum column, surfacing bad values as a conversion failure
/// instead of a panic.
fn parse_text_enum<T>(idx: usize, raw: String) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse QueuedMessage from a rusqlite Row with the MESSAGE_COLS order.
pub fn parse_message_row(row: &rusqlite::Row) -> rusqlite::Result<QueuedMessage> {
    Ok(QueuedMessage {
        id: row.get(0)?,
        message_id: row.get(1)?,
        correlation_id: row.get(2)?,
        agent_id: row.get(3)?,
        direction: parse_text_enum::<Direction>(4, row.get(4)?)?,
        message_type: row.get(5)?,
        payload: row.get(6)?,
        status: parse_text_enum::<MessageStatus>(7, row.get(7)?)?,
        priority: MessagePriority::from_i64(row.get(8)?),
        attempts: row.get::<_, i64>(9)? as u32,
        max_attempts: row.get::<_, i64>(10)? as u32,
        next_attempt_at: row.get(11)?,
        lease_expires_at: row.get(12)?,
        expires_at: row.get(13)?,
        last_error: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
        delivered_at: row.get(17)?,
        acknowledged_at: row.get(18)?,
    })
}

/// Insert a new message, minting its UUID. Returns the stored row.
pub fn enqueue_sync(
    conn: &Connection,
    message: &NewMessage,
    default_max_attempts: u32,
) -> rusqlite::Result<QueuedMessage> {
    let message_id = uuid::Uuid::new_v4().to_string();
    let max_attempts = message.max_attempts.unwrap_or(default_max_attempts).max(1);

    conn.execute(
        "INSERT INTO message_queue \
             (message_id, correlation_id, agent_id, direction, message_type, payload, \
              priority, max_attempts, expires_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, \
                 CASE WHEN ?9 IS NULL THEN NULL \
                      ELSE datetime('now', '+' || ?9 || ' seconds') END)",
        params![
            message_id,
            message.correlation_id,
            message.agent_id,
            message.direction.to_string(),
            message.message_type,
            message.payload.to_string(),
            message.priority.as_i64(),
            max_attempts as i64,
            message.ttl_secs,
        ],
    )?;

    let id = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT {MESSAGE_COLS} FROM message_queue WHERE id = ?"),
        [id],
        parse_message_row,
    )
}

/// Look up a message by its UUID.
pub fn get_by_message_id_sync(
    conn: &Connection,
    message_id: &str,
) -> rusqlite::Result<Option<QueuedMessage>> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLS} FROM message_queue WHERE message_id = ?"),
        [message_id],
        parse_message_row,
    )
    .optional()
}

/// Atomically lease up to `limit` dispatchable outbound messages for an agent.
///
/// Eligible rows are pending, past their backoff gate, and not expired.
/// The single UPDATE ... WHERE id IN (subselect) makes the claim atomic:
/// two concurrent pollers can never lease the same message. Each leased row
/// consumes one delivery attempt.
pub fn lease_batch_sync(
    conn: &Connection,
    agent_id: &str,
    limit: usize,
    lease_secs: u64,
) -> rusqlite::Result<Vec<QueuedMessage>> {
    let sql = format!(
        "UPDATE message_queue SET \
             status = 'leased', \
             attempts = attempts + 1, \
             lease_expires_at = datetime('now', '+' || ?3 || ' seconds'), \
             updated_at = datetime('now') \
         WHERE id IN ( \
             SELECT id FROM message_queue \
             WHERE agent_id = ?1 AND direction = 'outbound' AND status = 'pending' \
               AND (next_attempt_at IS NULL OR next_attempt_at <= datetime('now')) \
               AND (expires_at IS NULL OR expires_at > datetime('now')) \
             ORDER BY priority ASC, created_at ASC, id ASC \
             LIMIT ?2 \
         ) \
         RETURNING {MESSAGE_COLS}"
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut messages: Vec<QueuedMessage> = stmt
        .query_map(
            params![agent_id, limit as i64, lease_secs as i64],
            parse_message_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    // RETURNING yields rows in storage order; hand them out in dispatch order.
    messages.sort_by(|a, b| {
        (a.priority, &a.created_at, a.id).cmp(&(b.priority, &b.created_at, b.id))
    });
    Ok(messages)
}

/// Leased → delivered: the agent confirmed receipt. Stamps delivered_at on
/// the first delivery only.
pub fn mark_delivered_sync(conn: &Connection, message_id: &str) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE message_queue SET \
             status = 'delivered', \
             delivered_at = COALESCE(delivered_at, datetime('now')), \
             updated_at = datetime('now') \
         WHERE message_id = ?1 AND status = 'leased'",
        [message_id],
    )?;
    Ok(updated > 0)
}

/// Terminal success. Accepts leased and delivered outbound messages as well
/// as pending inbound ones (the server consuming its mailbox).
pub fn ack_sync(conn: &Connection, message_id: &str) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE message_queue SET \
             status = 'acknowledged', \
             acknowledged_at = datetime('now'), \
             lease_expires_at = NULL, \
             updated_at = datetime('now') \
         WHERE message_id = ?1 AND status IN ('pending', 'leased', 'delivered')",
        [message_id],
    )?;
    Ok(updated > 0)
}

/// Failure report for a leased or delivered message.
///
/// Reschedules with backoff while the attempt budget lasts, dead-letters
/// otherwise. Returns None when the message doesn't exist or isn't in a
/// failable state.
pub fn nack_sync(
    conn: &Connection,
    message_id: &str,
    error: &str,
    policy: &BackoffPolicy,
) -> rusqlite::Result<Option<NackOutcome>> {
    let row: Option<(i64, i64, String)> = conn
        .query_row(
            "SELECT attempts, max_attempts, status FROM message_queue WHERE message_id = ?",
            [message_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((attempts, max_attempts, status)) = row else {
        return Ok(None);
    };
    if status != "leased" && status != "delivered" {
        return Ok(None);
    }

    if attempts >= max_attempts {
        conn.execute(
            "UPDATE message_queue SET \
                 status = 'dead', \
                 last_error = ?2, \
                 lease_expires_at = NULL, \
                 next_attempt_at = NULL, \
                 updated_at = datetime('now') \
             WHERE message_id = ?1",
            params![message_id, error],
        )?;
        return Ok(Some(NackOutcome::DeadLettered));
    }

    let next_attempt_at = policy.next_attempt_at(attempts as u32);
    conn.execute(
        "UPDATE message_queue SET \
             status = 'pending', \
             last_error = ?2, \
             next_attempt_at = ?3, \
             lease_expires_at = NULL, \
             updated_at = datetime('now') \
         WHERE message_id = ?1",
        params![message_id, error, next_attempt_at],
    )?;
    Ok(Some(NackOutcome::Rescheduled { next_attempt_at }))
}

/// Sweep messages whose absolute TTL passed before acknowledgment.
pub fn expire_due_sync(conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE message_queue SET \
             status = 'expired', \
             lease_expires_at = NULL, \
             updated_at = datetime('now') \
         WHERE status IN ('pending', 'leased', 'delivered') \
           AND expires_at IS NOT NULL AND expires_at <= datetime('now')",
        [],
    )
}

/// Recover leases whose holder went silent.
///
/// Expired leases return to pending with a backoff delay (the attempt was
/// already consumed at lease time), or dead-letter when the budget is gone.
/// Returns (released, dead_lettered).
pub fn release_expired_leases_sync(
    conn: &Connection,
    policy: &BackoffPolicy,
) -> rusqlite::Result<(usize, usize)> {
    let mut stmt = conn.prepare(
        "SELECT message_id, attempts, max_attempts FROM message_queue \
         WHERE status = 'leased' AND lease_expires_at <= datetime('now')",
    )?;
    let stale: Vec<(String, i64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .filter_map(log_and_discard)
        .collect();

    let mut released = 0;
    let mut dead_lettered = 0;
    for (message_id, attempts, max_attempts) in stale {
        if attempts >= max_attempts {
            conn.execute(
                "UPDATE message_queue SET \
                     status = 'dead', \
                     last_error = 'lease expired', \
                     lease_expires_at = NULL, \
                     next_attempt_at = NULL, \
                     updated_at = datetime('now') \
                 WHERE message_id = ?1 AND status = 'leased'",
                [&message_id],
            )?;
            dead_lettered += 1;
        } else {
            let next_attempt_at = policy.next_attempt_at(attempts as u32);
            conn.execute(
                "UPDATE message_queue SET \
                     status = 'pending', \
                     last_error = 'lease expired', \
                     next_attempt_at = ?2, \
                     lease_expires_at = NULL, \
                     updated_at = datetime('now') \
                 WHERE message_id = ?1 AND status = 'leased'",
                params![message_id, next_attempt_at],
            )?;
            released += 1;
        }
    }

    Ok((released, dead_lettered))
}

/// Manual dead-letter replay: reset the attempt budget and requeue.
pub fn requeue_dead_sync(conn: &Connection, message_id: &str) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE message_queue SET \
             status = 'pending', \
             attempts = 0, \
             next_attempt_at = NULL, \
             lease_expires_at = NULL, \
             last_error = NULL, \
             updated_at = datetime('now') \
         WHERE message_id = ?1 AND status = 'dead'",
        [message_id],
    )?;
    Ok(updated > 0)
}

/// Acknowledge the outbound request a response correlates to.
///
/// Called when an agent submits a result: whatever delivery state the
/// request was in, a correlated response settles it.
pub fn ack_request_by_correlation_sync(
    conn: &Connection,
    correlation_id: &str,
) -> rusqlite::Result<bool> {
    let updated = conn.execute(
        "UPDATE message_queue SET \
             status = 'acknowledged', \
             acknowledged_at = datetime('now'), \
             lease_expires_at = NULL, \
             updated_at = datetime('now') \
         WHERE correlation_id = ?1 AND direction = 'outbound' \
           AND status IN ('pending', 'leased', 'delivered')",
        [correlation_id],
    )?;
    Ok(updated > 0)
}

/// Consume the inbound response matching a correlation id, if one arrived.
///
/// The returned message is acknowledged as part of the take, so repeated
/// calls with the same correlation id return None.
pub fn take_response_sync(
    conn: &Connection,
    correlation_id: &str,
) -> rusqlite::Result<Option<QueuedMessage>> {
    let found = conn
        .query_row(
            &format!(
                "SELECT {MESSAGE_COLS} FROM message_queue \
                 WHERE correlation_id = ?1 AND direction = 'inbound' AND status = 'pending' \
                 ORDER BY id ASC LIMIT 1"
            ),
            [correlation_id],
            parse_message_row,
        )
        .optional()?;

    match found {
        Some(mut message) => {
            ack_sync(conn, &message.message_id)?;
            message.status = MessageStatus::Acknowledged;
            Ok(Some(message))
        }
        None => Ok(None),
    }
}

/// Pending inbound messages without a parked waiter (status reports,
/// unsolicited results). Ordered for server-side consumption.
pub fn pending_inbound_sync(
    conn: &Connection,
    limit: usize,
) -> rusqlite::Result<Vec<QueuedMessage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLS} FROM message_queue \
         WHERE direction = 'inbound' AND status = 'pending' \
         ORDER BY priority ASC, created_at ASC, id ASC \
         LIMIT ?"
    ))?;
    let rows = stmt.query_map([limit as i64], parse_message_row)?;
    rows.collect()
}

/// Dead-lettered messages for inspection, newest first.
pub fn list_dead_sync(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<QueuedMessage>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLS} FROM message_queue \
         WHERE status = 'dead' \
         ORDER BY updated_at DESC, id DESC \
         LIMIT ?"
    ))?;
    let rows = stmt.query_map([limit as i64], parse_message_row)?;
    rows.collect()
}

/// Gather aggregate queue counters in one pass.
pub fn queue_stats_sync(conn: &Connection) -> rusqlite::Result<QueueStats> {
    let mut stats = QueueStats::default();

    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM message_queue GROUP BY status")?;
    let counts: Vec<(String, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .filter_map(log_and_discard)
        .collect();
    for (status, count) in counts {
        match status.as_str() {
            "pending" => stats.pending = count,
            "leased" => stats.leased = count,
            "delivered" => stats.delivered = count,
            "acknowledged" => stats.acknowledged = count,
            "expired" => stats.expired = count,
            "dead" => stats.dead = count,
            other => tracing::warn!("Unknown message status in stats: {}", other),
        }
    }

    stats.inbound_pending = conn.query_row(
        "SELECT COUNT(*) FROM message_queue WHERE direction = 'inbound' AND status = 'pending'",
        [],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT agent_id, COUNT(*) FROM message_queue \
         WHERE direction = 'outbound' AND status = 'pending' \
         GROUP BY agent_id ORDER BY COUNT(*) DESC",
    )?;
    stats.per_agent_backlog = stmt
        .query_map([], |row| {
            Ok(AgentBacklog {
                agent_id: row.get(0)?,
                pending: row.get(1)?,
            })
        })?
        .filter_map(log_and_discard)
        .collect();

    stats.oldest_pending_secs = conn.query_row(
        "SELECT CAST(strftime('%s', 'now') AS INTEGER) - CAST(strftime('%s', MIN(created_at)) AS INTEGER) \
         FROM message_queue WHERE direction = 'outbound' AND status = 'pending'",
        [],
        |row| row.get(0),
    )?;

    Ok(stats)
}

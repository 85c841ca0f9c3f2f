// src/db/agents_tests.rs
// Tests for the agent registry operations

use super::agents::{
    get_agent_sync, heartbeat_sync, list_agents_sync, mark_stale_agents_offline_sync,
    register_agent_sync,
};
use super::test_support::setup_test_pool;
use super::types::AgentStatus;

// ═══════════════════════════════════════
// register Tests
// ═══════════════════════════════════════

#[tokio::test]
async fn test_register_creates_agent() {
    let pool = setup_test_pool().await;

    let agent = pool
        .interact_raw(|conn| {
            register_agent_sync(conn, "agent-1", Some("web-01"))?;
            get_agent_sync(conn, "agent-1")
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(agent.agent_id, "agent-1");
    assert_eq!(agent.hostname.as_deref(), Some("web-01"));
    assert_eq!(agent.status, AgentStatus::Online);
}

#[tokio::test]
async fn test_reregister_keeps_id_and_updates_hostname() {
    let pool = setup_test_pool().await;

    let (first_id, second_id, agent) = pool
        .interact_raw(|conn| {
            let first_id = register_agent_sync(conn, "agent-1", Some("web-01"))?;
            let second_id = register_agent_sync(conn, "agent-1", Some("web-01-renamed"))?;
            let agent = get_agent_sync(conn, "agent-1")?;
            Ok((first_id, second_id, agent))
        })
        .await
        .unwrap();

    assert_eq!(first_id, second_id);
    assert_eq!(
        agent.unwrap().hostname.as_deref(),
        Some("web-01-renamed")
    );
}

#[tokio::test]
async fn test_reregister_without_hostname_preserves_previous() {
    let pool = setup_test_pool().await;

    let agent = pool
        .interact_raw(|conn| {
            register_agent_sync(conn, "agent-1", Some("web-01"))?;
            register_agent_sync(conn, "agent-1", None)?;
            get_agent_sync(conn, "agent-1")
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(agent.hostname.as_deref(), Some("web-01"));
}

// ═══════════════════════════════════════
// heartbeat Tests
// ═══════════════════════════════════════

#[tokio::test]
async fn test_heartbeat_unknown_agent() {
    let pool = setup_test_pool().await;

    let beat = pool
        .interact_raw(|conn| heartbeat_sync(conn, "ghost"))
        .await
        .unwrap();
    assert!(!beat);
}

#[tokio::test]
async fn test_heartbeat_revives_offline_agent() {
    let pool = setup_test_pool().await;

    let agent = pool
        .interact_raw(|conn| {
            register_agent_sync(conn, "agent-1", None)?;
            conn.execute(
                "UPDATE agents SET status = 'offline', last_seen = datetime('now', '-1 hour') \
                 WHERE agent_id = 'agent-1'",
                [],
            )?;
            assert!(heartbeat_sync(conn, "agent-1")?);
            get_agent_sync(conn, "agent-1")
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(agent.status, AgentStatus::Online);
}

// ═══════════════════════════════════════
// stale detection Tests
// ═══════════════════════════════════════

#[tokio::test]
async fn test_stale_sweep_only_flips_idle_agents() {
    let pool = setup_test_pool().await;

    let (flipped, fresh, stale) = pool
        .interact_raw(|conn| {
            register_agent_sync(conn, "fresh", None)?;
            register_agent_sync(conn, "stale", None)?;
            conn.execute(
                "UPDATE agents SET last_seen = datetime('now', '-1 hour') \
                 WHERE agent_id = 'stale'",
                [],
            )?;

            let flipped = mark_stale_agents_offline_sync(conn, 300)?;
            let fresh = get_agent_sync(conn, "fresh")?;
            let stale = get_agent_sync(conn, "stale")?;
            Ok((flipped, fresh, stale))
        })
        .await
        .unwrap();

    assert_eq!(flipped, 1);
    assert_eq!(fresh.unwrap().status, AgentStatus::Online);
    assert_eq!(stale.unwrap().status, AgentStatus::Offline);
}

// ═══════════════════════════════════════
// listing Tests
// ═══════════════════════════════════════

#[tokio::test]
async fn test_list_agents() {
    let pool = setup_test_pool().await;

    let list = pool
        .interact_raw(|conn| {
            register_agent_sync(conn, "a", Some("host-a"))?;
            register_agent_sync(conn, "b", Some("host-b"))?;
            list_agents_sync(conn)
        })
        .await
        .unwrap();

    assert_eq!(list.len(), 2);
}

#[tokio::test]
async fn test_get_agent_missing() {
    let pool = setup_test_pool().await;

    let agent = pool
        .interact_raw(|conn| get_agent_sync(conn, "nobody"))
        .await
        .unwrap();
    assert!(agent.is_none());
}

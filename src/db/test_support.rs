// src/db/test_support.rs
// Shared test helpers for database tests

use super::agents::register_agent_sync;
use super::pool::DatabasePool;
use std::sync::Arc;

/// Create a test pool (in-memory DB, no agents)
pub async fn setup_test_pool() -> Arc<DatabasePool> {
    Arc::new(
        DatabasePool::open_in_memory()
            .await
            .expect("Failed to open in-memory pool"),
    )
}

/// Create a test pool with a registered default agent
pub async fn setup_test_pool_with_agent() -> (Arc<DatabasePool>, String) {
    let pool = setup_test_pool().await;
    pool.interact_raw(|conn| register_agent_sync(conn, "agent-1", Some("host-1")))
        .await
        .expect("Failed to register agent");
    (pool, "agent-1".to_string())
}

// src/db/mod.rs
// Database layer: pooled SQLite access plus the broker's table operations

pub mod agents;
pub mod pool;
pub mod queue;
pub mod retention;
pub mod schema;
pub mod types;

#[cfg(test)]
pub mod test_support;

#[cfg(test)]
mod agents_tests;

pub use pool::DatabasePool;
pub use types::*;

/// Keep rows that parsed, log and drop the ones that didn't. For listing
/// queries where one corrupt row shouldn't fail the whole result.
pub(crate) fn log_and_discard<T>(result: rusqlite::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Discarding row that failed to parse: {}", e);
            None
        }
    }
}

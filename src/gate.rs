//! Authorization gate consulted by every real-time action and every
//! thread-scoped HTTP endpoint.
//!
//! Never caches: enablement can flip between two events on the same connection.

use sqlx::SqlitePool;

use crate::db::{self, ThreadId};

/// Whether `user_id` is one of the two members of the thread.
///
/// A missing thread has no members. With `require_enabled`, a disabled thread
/// admits nobody, its own members included.
pub async fn is_participant(
    db_pool: &SqlitePool,
    thread_id: ThreadId,
    user_id: &str,
    require_enabled: bool,
) -> Result<bool, sqlx::Error> {
    let Some(thread) = db::threads::participants(db_pool, thread_id).await? else {
        return Ok(false);
    };

    if require_enabled && !thread.enabled {
        return Ok(false);
    }

    Ok(thread.includes(user_id))
}

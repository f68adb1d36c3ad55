use sqlx::SqlitePool;
use time::OffsetDateTime;

use super::{CallId, CallSession, MediaKind, ThreadId};

pub async fn insert(
    db_pool: &SqlitePool,
    thread_id: ThreadId,
    kind: MediaKind,
    started_by_user_id: &str,
    started_at: OffsetDateTime,
) -> Result<CallSession, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO call_sessions (thread_id,kind,started_by_user_id,started_at,ended_at) VALUES (?,?,?,?,NULL)",
    )
    .bind(thread_id)
    .bind(kind.as_str())
    .bind(started_by_user_id)
    .bind(started_at)
    .execute(db_pool)
    .await?;

    Ok(CallSession {
        id: result.last_insert_rowid(),
        thread_id,
        kind,
        started_by_user_id: started_by_user_id.to_owned(),
        started_at,
        ended_at: None,
    })
}

pub async fn find(db_pool: &SqlitePool, call_id: CallId) -> Result<Option<CallSession>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id,thread_id,kind,started_by_user_id,started_at,ended_at FROM call_sessions WHERE id=?",
    )
    .bind(call_id)
    .fetch_optional(db_pool)
    .await
}

/// Sets `ended_at` unless it is already set. Returns whether this call wrote it.
pub async fn mark_ended(db_pool: &SqlitePool, call_id: CallId, ended_at: OffsetDateTime) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE call_sessions SET ended_at=? WHERE id=? AND ended_at IS NULL")
        .bind(ended_at)
        .bind(call_id)
        .execute(db_pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn open_sessions(db_pool: &SqlitePool) -> Result<Vec<CallSession>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id,thread_id,kind,started_by_user_id,started_at,ended_at FROM call_sessions \
         WHERE ended_at IS NULL ORDER BY id",
    )
    .fetch_all(db_pool)
    .await
}

use sqlx::SqlitePool;
use time::OffsetDateTime;

use super::{ProfileId, Thread, ThreadId, ThreadParticipants};

/// Returns the thread linking the pair, creating a disabled one if none exists yet.
pub async fn create(
    db_pool: &SqlitePool,
    supervisor_profile_id: ProfileId,
    student_profile_id: ProfileId,
) -> Result<ThreadId, sqlx::Error> {
    sqlx::query(
        "INSERT INTO threads (supervisor_profile_id,student_profile_id,enabled,created_at) VALUES (?,?,0,?)
         ON CONFLICT (supervisor_profile_id,student_profile_id) DO NOTHING",
    )
    .bind(supervisor_profile_id)
    .bind(student_profile_id)
    .bind(OffsetDateTime::now_utc())
    .execute(db_pool)
    .await?;

    let (id,): (ThreadId,) =
        sqlx::query_as("SELECT id FROM threads WHERE supervisor_profile_id=? AND student_profile_id=?")
            .bind(supervisor_profile_id)
            .bind(student_profile_id)
            .fetch_one(db_pool)
            .await?;

    Ok(id)
}

/// Returns false if no such thread exists.
pub async fn set_enabled(db_pool: &SqlitePool, thread_id: ThreadId, enabled: bool) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE threads SET enabled=? WHERE id=?")
        .bind(enabled)
        .bind(thread_id)
        .execute(db_pool)
        .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn find(db_pool: &SqlitePool, thread_id: ThreadId) -> Result<Option<Thread>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id,supervisor_profile_id,student_profile_id,enabled,created_at FROM threads WHERE id=?",
    )
    .bind(thread_id)
    .fetch_optional(db_pool)
    .await
}

pub async fn participants(
    db_pool: &SqlitePool,
    thread_id: ThreadId,
) -> Result<Option<ThreadParticipants>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT t.id AS thread_id, sup.user_id AS supervisor_user_id, stu.user_id AS student_user_id,
                  t.enabled AS enabled
           FROM threads t
           JOIN profiles sup ON sup.id = t.supervisor_profile_id
           JOIN profiles stu ON stu.id = t.student_profile_id
           WHERE t.id=?"#,
    )
    .bind(thread_id)
    .fetch_optional(db_pool)
    .await
}

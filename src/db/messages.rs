use sqlx::SqlitePool;
use time::OffsetDateTime;

use super::{Message, ThreadId};

pub async fn insert(
    db_pool: &SqlitePool,
    thread_id: ThreadId,
    sender_user_id: &str,
    text: &str,
    sent_at: OffsetDateTime,
) -> Result<Message, sqlx::Error> {
    let result = sqlx::query("INSERT INTO messages (thread_id,sender_user_id,text,sent_at) VALUES (?,?,?,?)")
        .bind(thread_id)
        .bind(sender_user_id)
        .bind(text)
        .bind(sent_at)
        .execute(db_pool)
        .await?;

    Ok(Message {
        id: result.last_insert_rowid(),
        thread_id,
        sender_user_id: sender_user_id.to_owned(),
        text: text.to_owned(),
        sent_at,
    })
}

/// The newest `take` messages of a thread, newest first.
pub async fn recent(db_pool: &SqlitePool, thread_id: ThreadId, take: i64) -> Result<Vec<Message>, sqlx::Error> {
    sqlx::query_as(
        "SELECT id,thread_id,sender_user_id,text,sent_at FROM messages WHERE thread_id=? ORDER BY id DESC LIMIT ?",
    )
    .bind(thread_id)
    .bind(take)
    .fetch_all(db_pool)
    .await
}

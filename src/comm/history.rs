use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;
use tracing::debug;

use crate::{
    AppError, AppResult, AppState,
    attachment::Attachment,
    db::{self, ThreadId, profiles::UNKNOWN_NAME},
    gate,
    session::require_user,
};

use super::protocol::MessageView;

pub const DEFAULT_TAKE: i64 = 50;
pub const MIN_TAKE: i64 = 10;
pub const MAX_TAKE: i64 = 200;

pub fn clamp_take(take: Option<i64>) -> i64 {
    take.unwrap_or(DEFAULT_TAKE).clamp(MIN_TAKE, MAX_TAKE)
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub take: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    #[serde(flatten)]
    pub message: MessageView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

/// Latest messages of a thread, oldest first.
#[debug_handler(state = AppState)]
pub async fn thread_history(
    Path(thread_id): Path<ThreadId>,
    Query(query): Query<HistoryQuery>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<HistoryItem>>> {
    let user_id = require_user(&session).await?;
    if !gate::is_participant(&db_pool, thread_id, &user_id, true).await? {
        return Err(AppError::Forbidden);
    }

    let take = clamp_take(query.take);
    let mut messages = db::messages::recent(&db_pool, thread_id, take).await?;
    messages.reverse();

    let senders: Vec<&str> = messages.iter().map(|m| m.sender_user_id.as_str()).collect();
    let names = db::profiles::display_names(&db_pool, &senders).await?;

    let items: Vec<HistoryItem> = messages
        .into_iter()
        .map(|message| {
            let sender_name = names
                .get(&message.sender_user_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_NAME.to_owned());
            let attachment = Attachment::decode(&message.text);
            HistoryItem {
                message: MessageView::new(message, sender_name),
                attachment,
            }
        })
        .collect();

    debug!(thread_id, user_id = %user_id, take, returned = items.len(), "history: served");
    Ok(Json(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_defaults_and_clamps() {
        assert_eq!(clamp_take(None), 50);
        assert_eq!(clamp_take(Some(0)), 10);
        assert_eq!(clamp_take(Some(-5)), 10);
        assert_eq!(clamp_take(Some(75)), 75);
        assert_eq!(clamp_take(Some(10_000)), 200);
    }
}

use time::OffsetDateTime;
use tracing::{debug, info};

use crate::db::{self, ThreadId};

use super::{
    Caller, CommHub, HubError,
    protocol::{HubEvent, MessageView},
};

pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Drops NULs, trims and clamps a chat body. `None` when nothing is left to send.
pub fn normalize_text(text: &str) -> Option<String> {
    let text = text.replace('\0', "");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let clamped = match text.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    };

    Some(clamped.to_owned())
}

impl CommHub {
    /// Persists then broadcasts. Throttled or blank sends return `Ok` and leave no trace.
    pub async fn send_message(&self, caller: &Caller, thread_id: ThreadId, text: &str) -> Result<(), HubError> {
        let user_id = self.authorize(caller, thread_id).await?;

        if !self.throttle.try_acquire(caller.conn_id) {
            debug!(conn = %caller.conn_id, thread_id, "msg: throttled");
            return Ok(());
        }

        let Some(text) = normalize_text(text) else {
            return Ok(());
        };

        let sent_at = OffsetDateTime::now_utc();
        let message = db::messages::insert(&self.db_pool, thread_id, user_id, &text, sent_at).await?;
        let sender_name = db::profiles::display_name(&self.db_pool, user_id).await?;

        info!(message_id = message.id, thread_id, user_id, chars = text.chars().count(), "msg: stored");

        self.broadcast(thread_id, HubEvent::ReceiveMessage(MessageView::new(message, sender_name)), None)
            .await;

        Ok(())
    }
}

use serde_json::Value;
use tracing::debug;

use crate::db::ThreadId;

use super::{Caller, CommHub, HubError, protocol::SignalKind};

impl CommHub {
    /// Forwards an offer, answer or ICE candidate to the other connections of
    /// the thread. The payload is never inspected or stored, and the sending
    /// connection does not get its own signal back.
    pub async fn relay_signal(
        &self,
        caller: &Caller,
        kind: SignalKind,
        thread_id: ThreadId,
        payload: Value,
    ) -> Result<(), HubError> {
        self.authorize(caller, thread_id).await?;

        let delivered = self
            .broadcast(thread_id, kind.into_event(payload), Some(caller.conn_id))
            .await;

        if delivered == 0 {
            debug!(conn = %caller.conn_id, thread_id, ?kind, "signal: nobody else in the thread");
        }

        Ok(())
    }
}

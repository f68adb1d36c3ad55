use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{self, CallId, CallSession, MediaKind, ThreadId};

use super::{
    Caller, CommHub, HubError,
    protocol::{CallEnded, CallStarted, HubEvent},
};

impl CommHub {
    /// Opens a call session and announces it to the thread.
    pub async fn start_call(
        &self,
        caller: &Caller,
        thread_id: ThreadId,
        kind: MediaKind,
    ) -> Result<CallSession, HubError> {
        let user_id = self.authorize(caller, thread_id).await?;

        let call = db::calls::insert(&self.db_pool, thread_id, kind, user_id, OffsetDateTime::now_utc()).await?;
        info!(call_id = call.id, thread_id, user_id, %kind, "calls: started");

        self.broadcast(thread_id, HubEvent::CallStarted(CallStarted::from(&call)), None)
            .await;

        Ok(call)
    }

    /// Ends a call. A missing or already ended call is a no-op, but the caller
    /// must still pass the gate for the call's thread.
    pub async fn end_call(&self, caller: &Caller, call_id: CallId) -> Result<(), HubError> {
        caller.user_id()?;

        let Some(call) = db::calls::find(&self.db_pool, call_id).await? else {
            debug!(conn = %caller.conn_id, call_id, "calls: end of unknown call ignored");
            return Ok(());
        };

        let user_id = self.authorize(caller, call.thread_id).await?;

        self.finish(&call, OffsetDateTime::now_utc()).await?;
        debug!(call_id, user_id, "calls: end requested");

        Ok(())
    }

    /// Closes sessions left open longer than `older_than`, e.g. after a browser
    /// crashed mid-call. Returns how many were closed.
    pub async fn close_stale_calls(&self, older_than: Duration) -> Result<usize, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let cutoff = now - older_than;

        let mut closed = 0;
        for call in db::calls::open_sessions(&self.db_pool).await? {
            if call.started_at > cutoff {
                continue;
            }
            if self.finish(&call, now).await? {
                let started_at = call.started_at;
                info!(call_id = call.id, thread_id = call.thread_id, %started_at, "calls: closed stale session");
                closed += 1;
            }
        }

        Ok(closed)
    }

    /// Writes the end time once and announces it. False if someone got there first.
    async fn finish(&self, call: &CallSession, ended_at: OffsetDateTime) -> Result<bool, sqlx::Error> {
        if !db::calls::mark_ended(&self.db_pool, call.id, ended_at).await? {
            debug!(call_id = call.id, "calls: already ended");
            return Ok(false);
        }

        self.broadcast(
            call.thread_id,
            HubEvent::CallEnded(CallEnded {
                call_id: call.id,
                ended_at,
            }),
            None,
        )
        .await;

        Ok(true)
    }
}

pub fn spawn_stale_call_sweeper(hub: CommHub, every: Duration, older_than: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match hub.close_stale_calls(older_than).await {
                Ok(0) => {}
                Ok(closed) => info!(closed, "calls: sweep finished"),
                Err(e) => warn!(error = %e, "calls: sweep failed"),
            }
        }
    })
}

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{db::ThreadId, gate};

use super::{
    HubError,
    groups::{ConnId, GroupRegistry, thread_group},
    protocol::{HubCall, HubEvent, Invocation, ServerFrame},
    throttle::ThrottleTracker,
};

/// Who is behind a live connection. Identity is bound at upgrade time and never
/// taken from the payload.
#[derive(Debug, Clone)]
pub struct Caller {
    pub conn_id: ConnId,
    pub user_id: Option<String>,
}

impl Caller {
    pub fn user_id(&self) -> Result<&str, HubError> {
        self.user_id.as_deref().ok_or(HubError::Unauthenticated)
    }
}

#[derive(Clone)]
pub struct CommHub {
    pub(super) db_pool: SqlitePool,
    pub(super) groups: Arc<dyn GroupRegistry>,
    pub(super) throttle: Arc<dyn ThrottleTracker>,
    outbox_capacity: usize,
}

impl CommHub {
    pub fn new(
        db_pool: SqlitePool,
        groups: Arc<dyn GroupRegistry>,
        throttle: Arc<dyn ThrottleTracker>,
        outbox_capacity: usize,
    ) -> Self {
        Self {
            db_pool,
            groups,
            throttle,
            outbox_capacity,
        }
    }

    pub fn outbox_capacity(&self) -> usize {
        self.outbox_capacity
    }

    pub async fn connect(&self, conn_id: ConnId, outbox: mpsc::Sender<ServerFrame>) {
        self.groups.connect(conn_id, outbox).await;
    }

    pub async fn disconnect(&self, conn_id: ConnId) {
        self.groups.disconnect(conn_id).await;
        self.throttle.forget(conn_id);
    }

    /// Resolves the caller and runs the gate for `thread_id`, enabled threads only.
    pub(super) async fn authorize<'c>(&self, caller: &'c Caller, thread_id: ThreadId) -> Result<&'c str, HubError> {
        let user_id = caller.user_id()?;
        if !gate::is_participant(&self.db_pool, thread_id, user_id, true).await? {
            debug!(conn = %caller.conn_id, user_id, thread_id, "hub: gate refused");
            return Err(HubError::NotAllowed);
        }

        Ok(user_id)
    }

    pub(super) async fn broadcast(&self, thread_id: ThreadId, event: HubEvent, except: Option<ConnId>) -> usize {
        let target = event.target();
        let delivered = self
            .groups
            .publish(&thread_group(thread_id), ServerFrame::Event(event), except)
            .await;

        debug!(thread_id, target, delivered, "hub: broadcast");
        delivered
    }

    pub async fn join_thread(&self, caller: &Caller, thread_id: ThreadId) -> Result<(), HubError> {
        let user_id = self.authorize(caller, thread_id).await?;

        if !self.groups.join(caller.conn_id, &thread_group(thread_id)).await {
            warn!(conn = %caller.conn_id, thread_id, "hub: join from a connection that is not registered");
            return Ok(());
        }

        info!(conn = %caller.conn_id, user_id, thread_id, "hub: joined thread");
        Ok(())
    }

    pub async fn invoke(&self, caller: &Caller, call: HubCall) -> Result<(), HubError> {
        match call {
            HubCall::JoinThread { thread_id } => self.join_thread(caller, thread_id).await,
            HubCall::SendMessage { thread_id, text } => self.send_message(caller, thread_id, &text).await,
            HubCall::Signal { kind, thread_id, payload } => self.relay_signal(caller, kind, thread_id, payload).await,
            HubCall::StartCall { thread_id, kind } => self.start_call(caller, thread_id, kind).await.map(|_| ()),
            HubCall::EndCall { call_id } => self.end_call(caller, call_id).await,
        }
    }

    /// Parses and runs one invocation. Returns the completion frame to send
    /// back, if the client asked for one.
    pub async fn dispatch(&self, caller: &Caller, invocation: Invocation) -> Option<ServerFrame> {
        let invocation_id = invocation.invocation_id.clone();
        let target = invocation.target.clone();

        let result = match HubCall::try_from(invocation) {
            Ok(call) => self.invoke(caller, call).await,
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(()) => None,
            Err(HubError::Store(e)) => {
                warn!(conn = %caller.conn_id, target = %target, error = %e, "hub: store failure");
                Some(HubError::Store(e).to_string())
            }
            Err(e) => {
                debug!(conn = %caller.conn_id, target = %target, error = %e, "hub: invocation refused");
                Some(e.to_string())
            }
        };

        invocation_id.map(|invocation_id| ServerFrame::Completion { invocation_id, error })
    }
}

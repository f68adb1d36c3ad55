use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;
use uuid::Uuid;

use crate::db::ThreadId;

use super::protocol::ServerFrame;

pub type ConnId = Uuid;

/// Broadcast group of a thread.
pub fn thread_group(thread_id: ThreadId) -> String {
    format!("thread-{thread_id}")
}

/// Live connections and the groups they joined.
///
/// Membership only grows while a connection lives; `disconnect` drops it from everything.
#[async_trait]
pub trait GroupRegistry: Send + Sync {
    async fn connect(&self, conn: ConnId, outbox: mpsc::Sender<ServerFrame>);

    /// Returns false if `conn` is not connected.
    async fn join(&self, conn: ConnId, group: &str) -> bool;

    async fn disconnect(&self, conn: ConnId);

    /// Fan `frame` out to every member of `group` except `except`.
    /// Returns how many outboxes accepted it.
    async fn publish(&self, group: &str, frame: ServerFrame, except: Option<ConnId>) -> usize;

    async fn members(&self, group: &str) -> Vec<ConnId>;
}

/// Process-local registry.
#[derive(Debug, Default)]
pub struct InMemoryGroups {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    conns: HashMap<ConnId, Connection>,
    groups: HashMap<String, HashSet<ConnId>>,
}

#[derive(Debug)]
struct Connection {
    outbox: mpsc::Sender<ServerFrame>,
    groups: HashSet<String>,
}

impl InMemoryGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.conns.len()
    }
}

impl Inner {
    fn remove(&mut self, conn: ConnId) {
        let Some(connection) = self.conns.remove(&conn) else {
            return;
        };

        for group in connection.groups {
            if let Some(members) = self.groups.get_mut(&group) {
                members.remove(&conn);
                if members.is_empty() {
                    self.groups.remove(&group);
                }
            }
        }
    }
}

#[async_trait]
impl GroupRegistry for InMemoryGroups {
    async fn connect(&self, conn: ConnId, outbox: mpsc::Sender<ServerFrame>) {
        let mut inner = self.inner.lock().await;
        inner.conns.insert(
            conn,
            Connection {
                outbox,
                groups: HashSet::new(),
            },
        );
    }

    async fn join(&self, conn: ConnId, group: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(connection) = inner.conns.get_mut(&conn) else {
            return false;
        };

        connection.groups.insert(group.to_owned());
        let members = inner.groups.entry(group.to_owned()).or_default();
        members.insert(conn);

        debug!(%conn, group, members = members.len(), "groups: joined");
        true
    }

    async fn disconnect(&self, conn: ConnId) {
        self.inner.lock().await.remove(conn);
    }

    async fn publish(&self, group: &str, frame: ServerFrame, except: Option<ConnId>) -> usize {
        let mut inner = self.inner.lock().await;
        let Some(members) = inner.groups.get(group) else {
            return 0;
        };

        let mut delivered = 0;
        let mut closed = Vec::new();

        for conn in members {
            if Some(*conn) == except {
                continue;
            }
            let Some(connection) = inner.conns.get(conn) else {
                continue;
            };

            match connection.outbox.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(%conn, group, "groups: outbox full, dropped frame");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*conn),
            }
        }

        for conn in closed {
            inner.remove(conn);
        }

        delivered
    }

    async fn members(&self, group: &str) -> Vec<ConnId> {
        let inner = self.inner.lock().await;
        inner
            .groups
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::timeout;

    use super::*;
    use crate::comm::protocol::HubEvent;

    fn offer(n: u64) -> ServerFrame {
        ServerFrame::Event(HubEvent::ReceiveOffer(json!({ "n": n })))
    }

    async fn connected(groups: &InMemoryGroups, capacity: usize) -> (ConnId, mpsc::Receiver<ServerFrame>) {
        let conn = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(capacity);
        groups.connect(conn, tx).await;
        (conn, rx)
    }

    #[tokio::test]
    async fn publish_reaches_only_group_members() {
        let groups = InMemoryGroups::new();
        let (a, mut rx_a) = connected(&groups, 8).await;
        let (_b, mut rx_b) = connected(&groups, 8).await;

        assert!(groups.join(a, &thread_group(1)).await);
        assert_eq!(groups.publish(&thread_group(1), offer(1), None).await, 1);

        assert_eq!(rx_a.recv().await, Some(offer(1)));
        assert!(timeout(Duration::from_millis(50), rx_b.recv()).await.is_err());
    }

    #[tokio::test]
    async fn publish_can_skip_the_sender() {
        let groups = InMemoryGroups::new();
        let (a, mut rx_a) = connected(&groups, 8).await;
        let (b, mut rx_b) = connected(&groups, 8).await;
        groups.join(a, "thread-7").await;
        groups.join(b, "thread-7").await;

        assert_eq!(groups.publish("thread-7", offer(2), Some(a)).await, 1);
        assert_eq!(rx_b.recv().await, Some(offer(2)));
        assert!(timeout(Duration::from_millis(50), rx_a.recv()).await.is_err());
    }

    #[tokio::test]
    async fn unknown_connection_cannot_join() {
        let groups = InMemoryGroups::new();
        assert!(!groups.join(Uuid::now_v7(), "thread-1").await);
        assert!(groups.members("thread-1").await.is_empty());
    }

    #[tokio::test]
    async fn disconnect_leaves_every_group() {
        let groups = InMemoryGroups::new();
        let (a, _rx) = connected(&groups, 8).await;
        groups.join(a, "thread-1").await;
        groups.join(a, "thread-2").await;

        groups.disconnect(a).await;

        assert!(groups.members("thread-1").await.is_empty());
        assert!(groups.members("thread-2").await.is_empty());
        assert_eq!(groups.connection_count().await, 0);
    }

    #[tokio::test]
    async fn full_outbox_drops_instead_of_blocking() {
        let groups = InMemoryGroups::new();
        let (a, mut rx) = connected(&groups, 1).await;
        groups.join(a, "thread-1").await;

        assert_eq!(groups.publish("thread-1", offer(1), None).await, 1);
        assert_eq!(groups.publish("thread-1", offer(2), None).await, 0);

        assert_eq!(rx.recv().await, Some(offer(1)));
        assert_eq!(groups.members("thread-1").await, vec![a]);
    }

    #[tokio::test]
    async fn closed_outboxes_are_pruned_on_publish() {
        let groups = InMemoryGroups::new();
        let (a, rx) = connected(&groups, 8).await;
        groups.join(a, "thread-1").await;
        drop(rx);

        assert_eq!(groups.publish("thread-1", offer(1), None).await, 0);
        assert_eq!(groups.connection_count().await, 0);
    }
}

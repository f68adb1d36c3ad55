#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thesis_comm::{
    comm::{
        Caller, CommHub,
        groups::InMemoryGroups,
        protocol::{HubEvent, Invocation, ServerFrame},
        throttle::{ManualClock, SendThrottle},
    },
    db::{self, ThreadId},
};
use tokio::{sync::mpsc, time::timeout};
use uuid::Uuid;

pub const SUPERVISOR: &str = "T1";
pub const STUDENT: &str = "S1";
pub const OUTSIDER: &str = "X9";

pub async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::migrate(&pool).await.unwrap();
    pool
}

/// A supervisor/student thread between `T1` and `S1`.
pub async fn seed_thread(pool: &SqlitePool, enabled: bool) -> ThreadId {
    let supervisor = db::profiles::create(pool, SUPERVISOR, "Dr. Tanaka").await.unwrap();
    let student = db::profiles::create(pool, STUDENT, "Sam Student").await.unwrap();
    let thread_id = db::threads::create(pool, supervisor, student).await.unwrap();
    db::threads::set_enabled(pool, thread_id, enabled).await.unwrap();
    thread_id
}

pub struct Harness {
    pub pool: SqlitePool,
    pub hub: CommHub,
    pub clock: Arc<ManualClock>,
}

pub async fn harness() -> Harness {
    let pool = pool().await;
    let clock = Arc::new(ManualClock::new());
    let hub = CommHub::new(
        pool.clone(),
        Arc::new(InMemoryGroups::new()),
        Arc::new(SendThrottle::with_clock(Duration::from_secs(1), clock.clone())),
        64,
    );

    Harness { pool, hub, clock }
}

impl Harness {
    pub async fn client(&self, user_id: Option<&str>) -> Client {
        let caller = Caller {
            conn_id: Uuid::now_v7(),
            user_id: user_id.map(str::to_owned),
        };
        let (tx, rx) = mpsc::channel(64);
        self.hub.connect(caller.conn_id, tx).await;

        Client {
            hub: self.hub.clone(),
            caller,
            rx,
        }
    }
}

/// One fake connection: a caller plus the outbox the hub writes to.
pub struct Client {
    pub hub: CommHub,
    pub caller: Caller,
    pub rx: mpsc::Receiver<ServerFrame>,
}

impl Client {
    /// Invokes `target` and returns the completion's error, if any.
    pub async fn call(&self, target: &str, arguments: Vec<serde_json::Value>) -> Option<String> {
        let mut invocation = Invocation::new(target, arguments);
        invocation.invocation_id = Some("1".to_owned());

        match self.hub.dispatch(&self.caller, invocation).await {
            Some(ServerFrame::Completion { error, .. }) => error,
            other => panic!("expected a completion, got {other:?}"),
        }
    }

    pub async fn next_event(&mut self) -> HubEvent {
        match timeout(Duration::from_millis(500), self.rx.recv()).await {
            Ok(Some(ServerFrame::Event(event))) => event,
            other => panic!("expected an event, got {other:?}"),
        }
    }

    pub async fn assert_silent(&mut self) {
        if let Ok(frame) = timeout(Duration::from_millis(50), self.rx.recv()).await {
            panic!("expected nothing, got {frame:?}");
        }
    }
}

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::{DashMap, mapref::entry::Entry};

use super::groups::ConnId;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-connection chat throttle.
pub trait ThrottleTracker: Send + Sync {
    /// True if a send from `conn` may go through now; records it as accepted.
    fn try_acquire(&self, conn: ConnId) -> bool;

    fn forget(&self, conn: ConnId);
}

/// Accepts at most one send per `min_interval` per connection, measured from
/// the last accepted send. Rejected attempts do not push the window forward.
pub struct SendThrottle {
    min_interval: Duration,
    last_accepted: DashMap<ConnId, Instant>,
    clock: Arc<dyn Clock>,
}

impl SendThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            last_accepted: DashMap::new(),
            clock,
        }
    }

    pub fn tracked(&self) -> usize {
        self.last_accepted.len()
    }
}

impl ThrottleTracker for SendThrottle {
    fn try_acquire(&self, conn: ConnId) -> bool {
        let now = self.clock.now();
        match self.last_accepted.entry(conn) {
            Entry::Occupied(mut last) => {
                if now.duration_since(*last.get()) < self.min_interval {
                    return false;
                }
                last.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    fn forget(&self, conn: ConnId) {
        self.last_accepted.remove(&conn);
    }
}

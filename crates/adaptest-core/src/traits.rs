//! Core trait definitions for the engine's external collaborators.
//!
//! The engine depends on these seams rather than on concrete storage or
//! wall-clock time, so hosts can plug in their own persistence and tests
//! can drive time by hand.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Session store
// ---------------------------------------------------------------------------

/// Persistence for serialized session snapshots.
///
/// Stores hold opaque JSON documents; the engine owns the schema.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch the snapshot saved under `id`, if any.
    async fn load(&self, id: Uuid) -> anyhow::Result<Option<String>>;

    /// Replace the snapshot saved under `id`.
    async fn save(&self, id: Uuid, snapshot: String) -> anyhow::Result<()>;
}

/// Process-local store backed by a map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: Uuid) -> anyhow::Result<Option<String>> {
        Ok(self.sessions.read().await.get(&id).cloned())
    }

    async fn save(&self, id: Uuid, snapshot: String) -> anyhow::Result<()> {
        self.sessions.write().await.insert(id, snapshot);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Exposure log
// ---------------------------------------------------------------------------

/// Memory of which items each test-taker saw recently.
///
/// Best-effort: implementations may drop updates under contention.
pub trait ExposureLog: Send + Sync {
    /// Item ids recently shown to `candidate`.
    fn recent(&self, candidate: &str) -> HashSet<String>;

    /// Note that `candidate` was shown `item_id`.
    fn record(&self, candidate: &str, item_id: &str);
}

/// In-memory, capacity-bounded [`ExposureLog`]. Oldest entries fall off
/// first.
#[derive(Debug)]
pub struct RecentItemLog {
    capacity: usize,
    entries: Mutex<HashMap<String, VecDeque<String>>>,
}

impl RecentItemLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl ExposureLog for RecentItemLog {
    fn recent(&self, candidate: &str) -> HashSet<String> {
        match self.entries.lock() {
            Ok(entries) => entries
                .get(candidate)
                .map(|q| q.iter().cloned().collect())
                .unwrap_or_default(),
            Err(_) => HashSet::new(),
        }
    }

    fn record(&self, candidate: &str, item_id: &str) {
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            let queue = entries.entry(candidate.to_string()).or_default();
            queue.retain(|id| id != item_id);
            queue.push_back(item_id.to_string());
            while queue.len() > self.capacity {
                queue.pop_front();
            }
        }
    }
}

/// Exposure log that remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExposureLog;

impl ExposureLog for NoExposureLog {
    fn recent(&self, _: &str) -> HashSet<String> {
        HashSet::new()
    }

    fn record(&self, _: &str, _: &str) {}
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

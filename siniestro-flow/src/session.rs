use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;
use uuid::Uuid;

use crate::{error::Result, machine::FlowStep, validation::ValidationResult};

/// Per-session state of the intake flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub step: FlowStep,
    pub validation: Option<ValidationResult>,
    pub selected_type: Option<String>,
    pub status_message: Option<String>,
    /// Bumped by every committed change; a write based on an older revision
    /// is refused.
    #[serde(default)]
    pub revision: u64,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            step: FlowStep::Validation,
            validation: None,
            selected_type: None,
            status_message: None,
            revision: 0,
        }
    }

    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

/// Trait for storing and retrieving flow sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: SessionRecord) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<SessionRecord>>;
    async fn delete(&self, id: &str) -> Result<()>;

    /// Stores `session` only if the stored record still has revision
    /// `expected`. Returns the stored record with its new revision, or `None`
    /// when the session is gone or was changed in the meantime.
    async fn replace(
        &self,
        session: SessionRecord,
        expected: u64,
    ) -> Result<Option<SessionRecord>>;
}

struct Entry {
    record: SessionRecord,
    touched: Instant,
}

/// In-memory implementation of SessionStore. Sessions idle for longer than
/// the TTL are dropped.
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, Entry>>,
    ttl: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drops every session idle for longer than the TTL.
    pub fn evict_expired(&self) -> usize {
        let before = self.sessions.len();
        let ttl = self.ttl;
        self.sessions.retain(|_, entry| entry.touched.elapsed() <= ttl);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "Expired idle sessions");
        }
        evicted
    }

    fn live(&self, entry: &Entry) -> bool {
        entry.touched.elapsed() <= self.ttl
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: SessionRecord) -> Result<()> {
        self.evict_expired();
        self.sessions.insert(
            session.id.clone(),
            Entry {
                record: session,
                touched: Instant::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<SessionRecord>> {
        let Some(mut entry) = self.sessions.get_mut(id) else {
            return Ok(None);
        };
        if !self.live(&entry) {
            drop(entry);
            self.sessions.remove_if(id, |_, entry| !self.live(entry));
            return Ok(None);
        }
        entry.touched = Instant::now();
        Ok(Some(entry.record.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }

    async fn replace(
        &self,
        mut session: SessionRecord,
        expected: u64,
    ) -> Result<Option<SessionRecord>> {
        let Some(mut entry) = self.sessions.get_mut(&session.id) else {
            return Ok(None);
        };
        if !self.live(&entry) || entry.record.revision != expected {
            return Ok(None);
        }
        session.revision = expected + 1;
        entry.record = session.clone();
        entry.touched = Instant::now();
        Ok(Some(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_round_trip_through_store() {
        let store = InMemorySessionStore::new();
        let mut record = SessionRecord::generate();
        assert!(Uuid::parse_str(&record.id).is_ok());

        store.save(record.clone()).await.unwrap();
        record.step = FlowStep::TypeSelection;
        store.save(record.clone()).await.unwrap();

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.step, FlowStep::TypeSelection);
        assert_eq!(store.len(), 1);

        store.delete(&record.id).await.unwrap();
        assert!(store.get(&record.id).await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn replace_refuses_stale_revision() {
        let store = InMemorySessionStore::new();
        let record = SessionRecord::new("s1");
        store.save(record.clone()).await.unwrap();

        let mut moved = record.clone();
        moved.step = FlowStep::TypeSelection;
        let stored = store.replace(moved, 0).await.unwrap().unwrap();
        assert_eq!(stored.revision, 1);

        // a second writer that also started from revision 0 loses
        assert!(store.replace(record.clone(), 0).await.unwrap().is_none());
        let current = store.get("s1").await.unwrap().unwrap();
        assert_eq!(current.step, FlowStep::TypeSelection);

        store.delete("s1").await.unwrap();
        assert!(store.replace(current, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn idle_sessions_expire() {
        let store = InMemorySessionStore::with_ttl(Duration::from_millis(100));
        store.save(SessionRecord::new("idle")).await.unwrap();
        store.save(SessionRecord::new("busy")).await.unwrap();

        for _ in 0..6 {
            tokio::time::sleep(Duration::from_millis(25)).await;
            assert!(store.get("busy").await.unwrap().is_some());
        }

        assert!(store.get("idle").await.unwrap().is_none());
        store.save(SessionRecord::new("fresh")).await.unwrap();
        assert_eq!(store.len(), 2);
    }
}

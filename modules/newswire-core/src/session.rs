use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use newswire_common::PipelineError;

use crate::cancel::CancelToken;
use crate::model::{EventData, SearchSession, SessionCounters, SessionStatus};

/// A session's live, mutable state plus the handles other tasks need to
/// observe or affect it. Cheap to clone — everything inside is shared.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub created_at: chrono::DateTime<Utc>,
    pub query_phrase: String,
    pub cancel: CancelToken,
    inner: Arc<Mutex<SessionInner>>,
}

struct SessionInner {
    status: SessionStatus,
    events: Vec<EventData>,
    counters: SessionCounters,
    last_activity: Instant,
}

impl SessionHandle {
    fn new(id: Uuid, query_phrase: String) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            query_phrase,
            cancel: CancelToken::new(),
            inner: Arc::new(Mutex::new(SessionInner {
                status: SessionStatus::Running,
                events: Vec::new(),
                counters: SessionCounters::default(),
                last_activity: Instant::now(),
            })),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().unwrap().status
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self.status(), SessionStatus::Running)
    }

    pub fn push_event(&self, event: EventData) {
        let mut inner = self.inner.lock().unwrap();
        inner.events.push(event);
        inner.counters.events_matched += 1;
        inner.last_activity = Instant::now();
    }

    pub fn update_counters(&self, f: impl FnOnce(&mut SessionCounters)) {
        let mut inner = self.inner.lock().unwrap();
        f(&mut inner.counters);
        inner.last_activity = Instant::now();
    }

    pub fn counters(&self) -> SessionCounters {
        self.inner.lock().unwrap().counters
    }

    pub fn event_count(&self) -> usize {
        self.inner.lock().unwrap().events.len()
    }

    /// Transitions to a terminal state. A no-op if already terminal
    /// (terminal states are absorbing, §4.6).
    pub fn finish(&self, status: SessionStatus) {
        let mut inner = self.inner.lock().unwrap();
        if inner.status == SessionStatus::Running {
            inner.status = status;
            inner.last_activity = Instant::now();
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn snapshot(&self) -> SearchSession {
        let inner = self.inner.lock().unwrap();
        SearchSession {
            id: self.id,
            created_at: self.created_at,
            query_phrase: self.query_phrase.clone(),
            status: inner.status,
            events: inner.events.clone(),
            counters: inner.counters,
        }
    }

    fn idle_for(&self) -> Duration {
        self.inner.lock().unwrap().last_activity.elapsed()
    }
}

/// In-memory `id → SearchSession` map with background eviction of sessions
/// idle longer than `ttl` (§4.6). Reads/writes take a short-held lock; no
/// session operation holds the registry lock across I/O — callers clone a
/// `SessionHandle` out and do their I/O against that.
pub struct SessionRegistry {
    sessions: std::sync::RwLock<HashMap<Uuid, SessionHandle>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: std::sync::RwLock::new(HashMap::new()),
            ttl,
        })
    }

    pub fn create(&self, query_phrase: String) -> SessionHandle {
        let id = Uuid::new_v4();
        let handle = SessionHandle::new(id, query_phrase);
        self.sessions.write().unwrap().insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: Uuid) -> Option<SearchSession> {
        self.sessions
            .read()
            .unwrap()
            .get(&id)
            .map(|h| h.snapshot())
    }

    pub fn get_handle(&self, id: Uuid) -> Option<SessionHandle> {
        self.sessions.read().unwrap().get(&id).cloned()
    }

    /// Sets the cancellation flag for a session. No-op on a terminal session
    /// (§4.6: "a second cancellation request on a terminal session is a
    /// no-op").
    pub fn mark_cancelled(&self, id: Uuid) -> Result<(), PipelineError> {
        let handle = self
            .sessions
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(PipelineError::NotFound)?;
        if !handle.is_terminal() {
            handle.cancel();
        }
        Ok(())
    }

    /// Removes sessions idle longer than `ttl`. Never iterates under the
    /// write lock for longer than the collect itself.
    pub fn evict_expired(&self) {
        let expired: Vec<Uuid> = {
            let sessions = self.sessions.read().unwrap();
            sessions
                .iter()
                .filter(|(_, handle)| handle.idle_for() > self.ttl)
                .map(|(id, _)| *id)
                .collect()
        };
        if expired.is_empty() {
            return;
        }
        let mut sessions = self.sessions.write().unwrap();
        for id in &expired {
            sessions.remove(id);
        }
        info!(count = expired.len(), "evicted idle sessions");
    }

    /// Spawns a background task that evicts expired sessions on `interval`.
    pub fn spawn_eviction_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.evict_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_get_round_trips() {
        let registry = SessionRegistry::new(Duration::from_secs(3600));
        let handle = registry.create("test query".to_string());
        let session = registry.get(handle.id).expect("session should exist");
        assert_eq!(session.status, SessionStatus::Running);
    }

    #[test]
    fn test_mark_cancelled_missing_session_errors() {
        let registry = SessionRegistry::new(Duration::from_secs(3600));
        let result = registry.mark_cancelled(Uuid::new_v4());
        assert!(matches!(result, Err(PipelineError::NotFound)));
    }

    #[test]
    fn test_mark_cancelled_sets_flag() {
        let registry = SessionRegistry::new(Duration::from_secs(3600));
        let handle = registry.create("q".to_string());
        registry.mark_cancelled(handle.id).unwrap();
        assert!(handle.cancel.is_cancelled());
    }

    #[test]
    fn test_mark_cancelled_on_terminal_session_is_noop() {
        let registry = SessionRegistry::new(Duration::from_secs(3600));
        let handle = registry.create("q".to_string());
        handle.finish(SessionStatus::Completed);
        registry.mark_cancelled(handle.id).unwrap();
        assert!(!handle.cancel.is_cancelled());
    }

    #[test]
    fn test_finish_is_absorbing() {
        let registry = SessionRegistry::new(Duration::from_secs(3600));
        let handle = registry.create("q".to_string());
        handle.finish(SessionStatus::Completed);
        handle.finish(SessionStatus::Failed);
        assert_eq!(handle.status(), SessionStatus::Completed);
    }
}

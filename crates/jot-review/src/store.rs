//! Conversation session store
//!
//! Each conversation owns one [`ConversationSession`] behind its own async
//! mutex. Holding the lock is what makes a caller the single writer of that
//! session's review state.

use crate::session::ReviewSession;
use crate::triage::FlaggedItem;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jot_record::{ExtractionRecord, PageType};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use ulid::Ulid;

/// Unique conversation session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Generate new session ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Page ingested into a conversation and not yet promoted
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPage {
    /// Detected page type
    pub page_type: PageType,
    /// Record as extracted
    pub record: ExtractionRecord,
    /// Items flagged for review at ingestion
    pub flagged: Vec<FlaggedItem>,
}

/// State held for one conversation
#[derive(Debug, Clone)]
pub struct ConversationSession {
    /// Last ingested page
    pub pending: Option<PendingPage>,
    /// Review state machine
    pub review: ReviewSession,
    last_activity: DateTime<Utc>,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationSession {
    /// Create empty session
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: None,
            review: ReviewSession::new(),
            last_activity: Utc::now(),
        }
    }

    /// Record activity now
    #[inline]
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Time of the last recorded activity
    #[inline]
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&mut self, at: DateTime<Utc>) {
        self.last_activity = at;
    }
}

/// Shared handle to one session; lock it to read or write
pub type SessionHandle = Arc<Mutex<ConversationSession>>;

/// Registry of conversation sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session and return its id
    async fn create(&self) -> SessionId;

    /// Look up a session
    async fn get(&self, id: SessionId) -> Option<SessionHandle>;

    /// Remove a session, returning whether it existed
    async fn delete(&self, id: SessionId) -> bool;

    /// Remove sessions idle for longer than `max_age`, returning how many
    async fn cleanup_older_than(&self, max_age: Duration) -> usize;

    /// Number of live sessions
    async fn len(&self) -> usize;
}

/// Process-local session store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl InMemorySessionStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> SessionId {
        let id = SessionId::new();
        self.sessions
            .insert(id, Arc::new(Mutex::new(ConversationSession::new())));
        tracing::debug!("Created session {}", id);
        id
    }

    async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    async fn delete(&self, id: SessionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            tracing::debug!("Deleted session {}", id);
        }
        removed
    }

    async fn cleanup_older_than(&self, max_age: Duration) -> usize {
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            // older than any representable time: nothing qualifies
            return 0;
        };
        let before = self.sessions.len();
        // a session whose lock is held is in use and therefore not idle
        self.sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.last_activity() >= cutoff,
            Err(_) => true,
        });
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::info!("Cleaned up {} idle session(s)", removed);
        }
        removed
    }

    async fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_delete() {
        let store = InMemorySessionStore::new();
        let id = store.create().await;

        assert!(store.get(id).await.is_some());
        assert_eq!(store.len().await, 1);
        assert!(store.delete(id).await);
        assert!(!store.delete(id).await);
        assert!(store.get(id).await.is_none());
    }

    #[tokio::test]
    async fn handles_share_state() {
        let store = InMemorySessionStore::new();
        let id = store.create().await;

        let first = store.get(id).await.unwrap();
        first.lock().await.pending = Some(PendingPage {
            page_type: PageType::Daily,
            record: ExtractionRecord::new(),
            flagged: Vec::new(),
        });

        let second = store.get(id).await.unwrap();
        assert!(second.lock().await.pending.is_some());
    }

    #[tokio::test]
    async fn cleanup_removes_only_idle_sessions() {
        let store = InMemorySessionStore::new();
        let stale = store.create().await;
        let fresh = store.create().await;

        store
            .get(stale)
            .await
            .unwrap()
            .lock()
            .await
            .set_last_activity(Utc::now() - Duration::hours(25));

        assert_eq!(store.cleanup_older_than(Duration::hours(24)).await, 1);
        assert!(store.get(stale).await.is_none());
        assert!(store.get(fresh).await.is_some());
    }

    #[tokio::test]
    async fn cleanup_with_huge_age_removes_nothing() {
        let store = InMemorySessionStore::new();
        let id = store.create().await;
        store
            .get(id)
            .await
            .unwrap()
            .lock()
            .await
            .set_last_activity(Utc::now() - Duration::days(3650));

        let forever = Duration::days(365 * 1_000_000);
        assert_eq!(store.cleanup_older_than(forever).await, 0);
        assert!(store.get(id).await.is_some());
    }

    #[tokio::test]
    async fn cleanup_keeps_locked_sessions() {
        let store = InMemorySessionStore::new();
        let id = store.create().await;
        let handle = store.get(id).await.unwrap();
        let mut guard = handle.lock().await;
        guard.set_last_activity(Utc::now() - Duration::hours(48));

        assert_eq!(store.cleanup_older_than(Duration::hours(24)).await, 0);
        drop(guard);
        assert_eq!(store.cleanup_older_than(Duration::hours(24)).await, 1);
    }

    #[test]
    fn session_id_parses_back() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-ulid".parse::<SessionId>().is_err());
    }
}

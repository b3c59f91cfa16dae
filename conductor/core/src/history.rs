//! History Store
//!
//! Append-only, per-session log of every complete message (user input and
//! finished assistant responses). Relays read it to replay a conversation
//! after reconnecting.
//!
//! The log is never rewritten or reordered. Each append refreshes the
//! session's expiry, so an idle conversation disappears after `ttl` while
//! an active one lives on.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{ConductorError, StoreError};
use crate::messages::{ChatMessage, SessionId};
use crate::store::{KeySpace, SharedStore};

/// Default history retention (24 hours)
pub const DEFAULT_HISTORY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Per-session ordered message log in the shared store
#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    ttl: Duration,
}

impl HistoryStore {
    /// Create a history store
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace, ttl: Duration) -> Self {
        Self { store, keys, ttl }
    }

    /// Retention applied on every append
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Append a message and refresh the session's expiry
    ///
    /// Returns the log length after the append.
    pub async fn append(
        &self,
        session: &SessionId,
        message: &ChatMessage,
    ) -> Result<usize, ConductorError> {
        let payload = message.to_json()?;
        let len = self
            .store
            .append_with_ttl(&self.keys.history(session), &payload, self.ttl)
            .await?;
        tracing::trace!(
            session_id = %session,
            message_id = %message.message_id,
            len,
            "History appended"
        );
        Ok(len)
    }

    /// Read the full log in append order
    ///
    /// Entries that no longer parse are skipped with a warning.
    pub async fn read_all(&self, session: &SessionId) -> Result<Vec<ChatMessage>, StoreError> {
        let raw = self.store.range_all(&self.keys.history(session)).await?;
        let mut messages = Vec::with_capacity(raw.len());
        for (index, payload) in raw.iter().enumerate() {
            match ChatMessage::from_json(payload) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(
                        session_id = %session,
                        index,
                        error = %e,
                        "Skipping malformed history entry"
                    );
                }
            }
        }
        Ok(messages)
    }

    /// Number of stored entries (malformed ones included)
    pub async fn len(&self, session: &SessionId) -> Result<usize, StoreError> {
        self.store.list_len(&self.keys.history(session)).await
    }

    /// Delete the session's log
    pub async fn clear(&self, session: &SessionId) -> Result<(), StoreError> {
        let existed = self.store.delete(&self.keys.history(session)).await?;
        tracing::debug!(session_id = %session, existed, "History cleared");
        Ok(())
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("store", &self.store.name())
            .field("keys", &self.keys)
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MessageId, UserId};
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn history(store: Arc<MemoryStore>) -> HistoryStore {
        HistoryStore::new(store, KeySpace::default(), DEFAULT_HISTORY_TTL)
    }

    fn user_message(session: &SessionId, content: &str) -> ChatMessage {
        ChatMessage::user(MessageId::new(), session.clone(), UserId::default(), content)
    }

    #[tokio::test]
    async fn test_append_and_read_in_order() {
        let history = history(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");

        let first = user_message(&session, "first");
        let second = user_message(&session, "second");
        assert_eq!(history.append(&session, &first).await.unwrap(), 1);
        assert_eq!(history.append(&session, &second).await.unwrap(), 2);

        let messages = history.read_all(&session).await.unwrap();
        assert_eq!(messages, vec![first, second]);
        assert_eq!(history.len(&session).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_round_trip_is_field_identical() {
        let history = history(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");
        let original = ChatMessage::assistant_final(
            MessageId::new(),
            session.clone(),
            UserId::new("alice"),
            "multi\nline \"quoted\" content",
        );

        history.append(&session, &original).await.unwrap();
        let read = history.read_all(&session).await.unwrap();
        assert_eq!(read, vec![original]);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let history = history(Arc::new(MemoryStore::new()));
        let a = SessionId::new("a");
        let b = SessionId::new("b");
        history.append(&a, &user_message(&a, "for a")).await.unwrap();

        assert!(history.read_all(&b).await.unwrap().is_empty());
        assert_eq!(history.len(&b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_malformed_entries_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let history = history(store.clone());
        let session = SessionId::new("s1");
        let good = user_message(&session, "good");

        history.append(&session, &good).await.unwrap();
        store
            .append_with_ttl("chat:history:s1", "{not json", DEFAULT_HISTORY_TTL)
            .await
            .unwrap();

        assert_eq!(history.read_all(&session).await.unwrap(), vec![good]);
        assert_eq!(history.len(&session).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear() {
        let history = history(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");
        history
            .append(&session, &user_message(&session, "gone soon"))
            .await
            .unwrap();

        history.clear(&session).await.unwrap();
        assert!(history.read_all(&session).await.unwrap().is_empty());
        // Clearing an empty session is fine
        history.clear(&session).await.unwrap();
    }

    #[tokio::test]
    async fn test_history_expires() {
        let store = Arc::new(MemoryStore::new());
        let history = HistoryStore::new(store, KeySpace::default(), Duration::from_millis(30));
        let session = SessionId::new("s1");
        history
            .append(&session, &user_message(&session, "short lived"))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(history.read_all(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_fails_when_store_offline() {
        let store = Arc::new(MemoryStore::new());
        let history = history(store.clone());
        store.set_available(false);

        let err = history.read_all(&SessionId::new("s1")).await.unwrap_err();
        assert!(err.is_unavailable());
    }
}

//! Active-Stream Registry & Cancellation Signals
//!
//! Two small pieces of cross-process state, both plain TTL'd keys:
//!
//! - the **active record** names the message currently streaming in a
//!   session; its expiry is the only crash signal for a producer that died
//!   without cleaning up
//! - a **cancellation signal** is a flag for one (session, message) pair
//!   that the producer polls; it is advisory and sticky until it expires
//!
//! # Design Philosophy
//!
//! A canceller may be in a different process from the producer, so nothing
//! here holds a lock or an in-process map. `cancel` also accepts requests
//! that race ahead of stream registration: with no active record it writes
//! a short-lived speculative signal that the producer will still see on its
//! first check.

use std::sync::Arc;
use std::time::Duration;

use crate::error::StoreError;
use crate::messages::{MessageId, SessionId};
use crate::store::{KeySpace, SharedStore};

/// Default active record lifetime (5 minutes)
pub const DEFAULT_ACTIVE_STREAM_TTL: Duration = Duration::from_secs(300);

/// Default lifetime of a cancellation signal for a known stream
pub const DEFAULT_CANCEL_TTL: Duration = Duration::from_secs(60);

/// Default lifetime of a signal written when no stream is active yet
pub const DEFAULT_SPECULATIVE_CANCEL_TTL: Duration = Duration::from_secs(10);

const CANCEL_FLAG: &str = "1";

/// TTLs used by the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryTtls {
    /// Active record lifetime
    pub active_stream: Duration,
    /// Signal lifetime when the target stream is active
    pub cancel: Duration,
    /// Signal lifetime when no stream is active
    pub speculative_cancel: Duration,
}

impl Default for RegistryTtls {
    fn default() -> Self {
        Self {
            active_stream: DEFAULT_ACTIVE_STREAM_TTL,
            cancel: DEFAULT_CANCEL_TTL,
            speculative_cancel: DEFAULT_SPECULATIVE_CANCEL_TTL,
        }
    }
}

/// Result of a cancel request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The target is the active stream; the signal was set
    Signalled,
    /// No stream was active; a short-lived signal was set in case the
    /// target is about to start
    SpeculativelySignalled,
    /// A different message is streaming; nothing was written
    Mismatch {
        /// The message that is actually active
        active: MessageId,
    },
}

impl CancelOutcome {
    /// Whether the request was accepted
    #[must_use]
    pub fn accepted(&self) -> bool {
        !matches!(self, Self::Mismatch { .. })
    }
}

/// Shared-store backed registry of active streams and cancel signals
#[derive(Clone)]
pub struct StreamRegistry {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
    ttls: RegistryTtls,
}

impl StreamRegistry {
    /// Create a registry
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace, ttls: RegistryTtls) -> Self {
        Self { store, keys, ttls }
    }

    /// Configured TTLs
    #[must_use]
    pub fn ttls(&self) -> RegistryTtls {
        self.ttls
    }

    // ========================================================================
    // Active record
    // ========================================================================

    /// Mark `message` as the session's active stream
    ///
    /// A record left by another stream is replaced; the replaced stream
    /// keeps running but can no longer be targeted by `cancel`.
    pub async fn register_active(
        &self,
        session: &SessionId,
        message: &MessageId,
    ) -> Result<(), StoreError> {
        let key = self.keys.active(session);
        match self.store.get(&key).await {
            Ok(Some(previous)) if previous != message.as_str() => {
                tracing::warn!(
                    session_id = %session,
                    message_id = %message,
                    previous = %previous,
                    "Replacing active stream record"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(session_id = %session, error = %e, "Could not read previous active record");
            }
        }
        self.store
            .set_with_ttl(&key, message.as_str(), self.ttls.active_stream)
            .await?;
        tracing::debug!(session_id = %session, message_id = %message, "Active stream registered");
        Ok(())
    }

    /// Message currently streaming in a session, if any
    pub async fn get_active(&self, session: &SessionId) -> Result<Option<MessageId>, StoreError> {
        Ok(self
            .store
            .get(&self.keys.active(session))
            .await?
            .map(MessageId::from_string))
    }

    /// Remove the session's active record unconditionally
    pub async fn clear_active(&self, session: &SessionId) -> Result<bool, StoreError> {
        self.store.delete(&self.keys.active(session)).await
    }

    /// Remove the active record only if it still names `message`
    pub async fn clear_active_if(
        &self,
        session: &SessionId,
        message: &MessageId,
    ) -> Result<bool, StoreError> {
        self.store
            .delete_if_equals(&self.keys.active(session), message.as_str())
            .await
    }

    // ========================================================================
    // Cancellation signals
    // ========================================================================

    /// Set the cancellation flag for a message
    pub async fn set_cancel(
        &self,
        session: &SessionId,
        message: &MessageId,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.store
            .set_with_ttl(&self.keys.cancel(session, message), CANCEL_FLAG, ttl)
            .await
    }

    /// Whether a message has been asked to stop
    ///
    /// Fails open: if the store cannot be read the stream keeps going.
    pub async fn check_cancel(&self, session: &SessionId, message: &MessageId) -> bool {
        match self.store.exists(&self.keys.cancel(session, message)).await {
            Ok(present) => present,
            Err(e) => {
                tracing::warn!(
                    session_id = %session,
                    message_id = %message,
                    error = %e,
                    "Cancellation check failed; assuming not cancelled"
                );
                false
            }
        }
    }

    /// Remove a message's cancellation flag
    pub async fn clear_cancel(
        &self,
        session: &SessionId,
        message: &MessageId,
    ) -> Result<bool, StoreError> {
        self.store.delete(&self.keys.cancel(session, message)).await
    }

    // ========================================================================
    // Caller-facing cancel
    // ========================================================================

    /// Ask a stream to stop
    pub async fn cancel(
        &self,
        session: &SessionId,
        message: &MessageId,
    ) -> Result<CancelOutcome, StoreError> {
        let outcome = match self.get_active(session).await? {
            Some(active) if active == *message => {
                self.set_cancel(session, message, self.ttls.cancel).await?;
                CancelOutcome::Signalled
            }
            Some(active) => CancelOutcome::Mismatch { active },
            None => {
                self.set_cancel(session, message, self.ttls.speculative_cancel)
                    .await?;
                CancelOutcome::SpeculativelySignalled
            }
        };

        match &outcome {
            CancelOutcome::Mismatch { active } => tracing::info!(
                session_id = %session,
                message_id = %message,
                active = %active,
                "Cancel ignored: another message is streaming"
            ),
            _ => tracing::info!(
                session_id = %session,
                message_id = %message,
                outcome = ?outcome,
                "Cancellation requested"
            ),
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("store", &self.store.name())
            .field("keys", &self.keys)
            .field("ttls", &self.ttls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry(store: Arc<MemoryStore>) -> StreamRegistry {
        StreamRegistry::new(store, KeySpace::default(), RegistryTtls::default())
    }

    #[tokio::test]
    async fn test_register_and_clear_active() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");
        let message = MessageId::new();

        assert_eq!(registry.get_active(&session).await.unwrap(), None);
        registry.register_active(&session, &message).await.unwrap();
        assert_eq!(registry.get_active(&session).await.unwrap(), Some(message.clone()));

        assert!(registry.clear_active(&session).await.unwrap());
        assert_eq!(registry.get_active(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_newer_registration_replaces_older() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");
        let older = MessageId::new();
        let newer = MessageId::new();

        registry.register_active(&session, &older).await.unwrap();
        registry.register_active(&session, &newer).await.unwrap();
        assert_eq!(registry.get_active(&session).await.unwrap(), Some(newer.clone()));

        // The older stream finishing must not erase the newer record
        assert!(!registry.clear_active_if(&session, &older).await.unwrap());
        assert_eq!(registry.get_active(&session).await.unwrap(), Some(newer.clone()));
        assert!(registry.clear_active_if(&session, &newer).await.unwrap());
    }

    #[tokio::test]
    async fn test_active_record_expires() {
        let store = Arc::new(MemoryStore::new());
        let registry = StreamRegistry::new(
            store,
            KeySpace::default(),
            RegistryTtls {
                active_stream: Duration::from_millis(30),
                ..RegistryTtls::default()
            },
        );
        let session = SessionId::new("s1");
        registry.register_active(&session, &MessageId::new()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(registry.get_active(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cancel_active_stream() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");
        let message = MessageId::new();
        registry.register_active(&session, &message).await.unwrap();

        let outcome = registry.cancel(&session, &message).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Signalled);
        assert!(outcome.accepted());
        assert!(registry.check_cancel(&session, &message).await);
    }

    #[tokio::test]
    async fn test_cancel_mismatch_writes_nothing() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");
        let active = MessageId::new();
        let stale = MessageId::new();
        registry.register_active(&session, &active).await.unwrap();

        let outcome = registry.cancel(&session, &stale).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Mismatch { active: active.clone() });
        assert!(!outcome.accepted());
        assert!(!registry.check_cancel(&session, &stale).await);
        assert!(!registry.check_cancel(&session, &active).await);
    }

    #[tokio::test]
    async fn test_speculative_cancel_is_idempotent() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");
        let message = MessageId::new();

        for _ in 0..2 {
            let outcome = registry.cancel(&session, &message).await.unwrap();
            assert_eq!(outcome, CancelOutcome::SpeculativelySignalled);
        }
        assert!(registry.check_cancel(&session, &message).await);
    }

    #[tokio::test]
    async fn test_speculative_signal_uses_short_ttl() {
        let store = Arc::new(MemoryStore::new());
        let registry = StreamRegistry::new(
            store,
            KeySpace::default(),
            RegistryTtls {
                speculative_cancel: Duration::from_millis(30),
                ..RegistryTtls::default()
            },
        );
        let session = SessionId::new("s1");
        let message = MessageId::new();

        registry.cancel(&session, &message).await.unwrap();
        assert!(registry.check_cancel(&session, &message).await);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!registry.check_cancel(&session, &message).await);
    }

    #[tokio::test]
    async fn test_check_cancel_fails_open() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(store.clone());
        let session = SessionId::new("s1");
        let message = MessageId::new();
        registry
            .set_cancel(&session, &message, DEFAULT_CANCEL_TTL)
            .await
            .unwrap();

        store.set_available(false);
        assert!(!registry.check_cancel(&session, &message).await);
        assert!(registry.cancel(&session, &message).await.is_err());
    }

    #[tokio::test]
    async fn test_clear_cancel() {
        let registry = registry(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");
        let message = MessageId::new();
        registry
            .set_cancel(&session, &message, DEFAULT_CANCEL_TTL)
            .await
            .unwrap();

        assert!(registry.clear_cancel(&session, &message).await.unwrap());
        assert!(!registry.check_cancel(&session, &message).await);
    }
}

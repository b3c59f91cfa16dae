//! Broadcast Channel
//!
//! Best-effort fan-out of message events to whoever is subscribed to a
//! session right now. Nothing is persisted here: a relay that is not
//! subscribed at publish time never sees the event live and has to recover
//! it from history.
//!
//! Publishing never fails from the caller's point of view. A delivery count
//! of zero and store errors are both logged and swallowed so a stream keeps
//! going while no one is listening or the store hiccups.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::StoreError;
use crate::messages::{ChatMessage, SessionId};
use crate::store::{KeySpace, SharedStore};

/// Live messages for one relay subscription
pub type MessageStream = BoxStream<'static, ChatMessage>;

/// Publishes message events on per-session channels
#[derive(Clone)]
pub struct ChunkPublisher {
    store: Arc<dyn SharedStore>,
    keys: KeySpace,
}

impl ChunkPublisher {
    /// Create a publisher
    pub fn new(store: Arc<dyn SharedStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Publish a message to the session's channel
    ///
    /// Returns how many subscribers received it; 0 on store failure.
    pub async fn publish(&self, session: &SessionId, message: &ChatMessage) -> usize {
        let payload = match message.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    session_id = %session,
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to encode message for broadcast"
                );
                return 0;
            }
        };

        match self.store.publish(&self.keys.channel(session), &payload).await {
            Ok(0) => {
                tracing::debug!(
                    session_id = %session,
                    message_id = %message.message_id,
                    "Broadcast had no subscribers"
                );
                0
            }
            Ok(delivered) => {
                tracing::trace!(
                    session_id = %session,
                    message_id = %message.message_id,
                    delivered,
                    "Broadcast delivered"
                );
                delivered
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session,
                    message_id = %message.message_id,
                    error = %e,
                    "Broadcast failed; continuing"
                );
                0
            }
        }
    }

    /// Subscribe to a session's channel
    ///
    /// The subscription is live when this returns. Payloads that do not
    /// decode as a [`ChatMessage`] are skipped.
    pub async fn subscribe(&self, session: &SessionId) -> Result<MessageStream, StoreError> {
        let payloads = self.store.subscribe(&self.keys.channel(session)).await?;
        let session = session.clone();
        let messages = payloads.filter_map(move |payload| {
            let decoded = ChatMessage::from_json(&payload);
            if let Err(e) = &decoded {
                tracing::warn!(
                    session_id = %session,
                    error = %e,
                    "Skipping malformed broadcast payload"
                );
            }
            futures::future::ready(decoded.ok())
        });
        Ok(messages.boxed())
    }
}

impl std::fmt::Debug for ChunkPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkPublisher")
            .field("store", &self.store.name())
            .field("keys", &self.keys)
            .finish()
    }
}

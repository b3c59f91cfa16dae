//! Relay Helpers
//!
//! What a transport needs to join a session without losing messages.
//!
//! # Ordering Guard
//!
//! ```text
//!   unguarded:  read_all ──── gap ──── subscribe      chunk in gap is lost
//!   guarded:    subscribe ── read_all                 chunk in gap arrives
//!                                                     live (maybe twice)
//! ```
//!
//! [`attach`] subscribes first and then reads history, so the snapshot and
//! the live stream overlap instead of leaving a gap. The overlap produces
//! duplicates, which [`ReplayBuffer`] absorbs: every emission carries the
//! full content, so keeping the most complete version per message is
//! enough and chunks are never concatenated.

use std::collections::HashMap;

use crate::broadcast::{ChunkPublisher, MessageStream};
use crate::error::StoreError;
use crate::history::HistoryStore;
use crate::messages::{ChatMessage, MessageId, SessionId};

/// A session joined with the ordering guard applied
pub struct AttachedSession {
    /// Snapshot of the history, read after the subscription was live
    pub history: Vec<ChatMessage>,
    /// Live messages from the moment of subscription
    pub live: MessageStream,
}

impl std::fmt::Debug for AttachedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachedSession")
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// Subscribe to a session's broadcast, then read its history
pub async fn attach(
    publisher: &ChunkPublisher,
    history: &HistoryStore,
    session: &SessionId,
) -> Result<AttachedSession, StoreError> {
    let live = publisher.subscribe(session).await?;
    let snapshot = history.read_all(session).await?;
    tracing::debug!(session_id = %session, replayed = snapshot.len(), "Relay attached");
    Ok(AttachedSession {
        history: snapshot,
        live,
    })
}

/// Idempotent view of a conversation built from snapshots and live events
///
/// Per message ID the buffer keeps the longest non-final content seen; a
/// final emission replaces it and is never replaced itself. Messages are
/// listed in order of first appearance.
#[derive(Clone, Debug, Default)]
pub struct ReplayBuffer {
    order: Vec<MessageId>,
    messages: HashMap<MessageId, ChatMessage>,
}

impl ReplayBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one emission; returns whether the visible state changed
    pub fn apply(&mut self, message: ChatMessage) -> bool {
        match self.messages.get(&message.message_id) {
            None => {
                self.order.push(message.message_id.clone());
                self.messages.insert(message.message_id.clone(), message);
                true
            }
            Some(existing) if existing.is_complete => false,
            Some(existing) => {
                if message.is_complete || message.content.len() > existing.content.len() {
                    self.messages.insert(message.message_id.clone(), message);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Apply a batch (e.g. a history snapshot)
    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        for message in messages {
            self.apply(message);
        }
    }

    /// Current state of one message
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.get(id)
    }

    /// Messages in order of first appearance
    pub fn messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.order.iter().filter_map(|id| self.messages.get(id))
    }

    /// Number of distinct messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing has been applied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

//! Store key layout
//!
//! One place that knows how logical partitions map onto store keys:
//!
//! ```text
//! {prefix}:history:{session}            list of JSON messages, TTL history_ttl
//! {prefix}:stream:{session}             pub/sub channel, no persistence
//! {prefix}:active:{session}             message id, TTL active_stream_ttl
//! {prefix}:cancel:{session}:{message}   "1", TTL cancel_ttl
//! ```

use crate::messages::{MessageId, SessionId};

/// Default key namespace
pub const DEFAULT_KEY_PREFIX: &str = "chat";

/// Builds store keys under a namespace prefix
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl KeySpace {
    /// Create a key space; blank prefixes fall back to the default
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim().trim_end_matches(':');
        let prefix = if trimmed.is_empty() {
            DEFAULT_KEY_PREFIX.to_string()
        } else {
            trimmed.to_string()
        };
        Self { prefix }
    }

    /// The namespace prefix
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// History log key for a session
    #[must_use]
    pub fn history(&self, session: &SessionId) -> String {
        format!("{}:history:{}", self.prefix, session)
    }

    /// Broadcast channel for a session
    #[must_use]
    pub fn channel(&self, session: &SessionId) -> String {
        format!("{}:stream:{}", self.prefix, session)
    }

    /// Active-stream record key for a session
    #[must_use]
    pub fn active(&self, session: &SessionId) -> String {
        format!("{}:active:{}", self.prefix, session)
    }

    /// Cancellation signal key for one message of a session
    #[must_use]
    pub fn cancel(&self, session: &SessionId, message: &MessageId) -> String {
        format!("{}:cancel:{}:{}", self.prefix, session, message)
    }
}

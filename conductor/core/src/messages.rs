//! Chat Messages
//!
//! The wire and storage format shared by every participant: the producer
//! publishes these, the history log stores them, relays replay them.
//!
//! # Design Philosophy
//!
//! A message is self-describing. Every emission for an assistant response
//! carries the full accumulated `content` alongside the `chunk` delta, so a
//! consumer that sees the same message twice (history snapshot plus live
//! broadcast) can simply apply the latest content instead of concatenating
//! deltas. Exactly one emission per `message_id` has `is_complete = true`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Session identifier
///
/// Opaque to the conductor; callers choose it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a session ID from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID (UUID v4)
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an existing ID (e.g. one read back from the store)
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Fallback used when the caller does not identify the user
    pub const DEFAULT: &'static str = "default_user";

    /// Create a user ID from a string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the string value
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Generated response
    Assistant,
}

impl MessageRole {
    /// Lowercase wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message as published on the broadcast channel and stored in history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID (shared by every emission of one response)
    pub message_id: MessageId,
    /// Session this message belongs to
    pub session_id: SessionId,
    /// User the conversation belongs to
    pub user_id: UserId,
    /// Who sent this message
    pub role: MessageRole,
    /// Full accumulated content at the time of this emission
    pub content: String,
    /// Delta since the previous emission (non-final assistant emissions only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    /// Whether this is the final emission for `message_id`
    pub is_complete: bool,
    /// When this emission was created (Unix timestamp ms)
    pub timestamp: u64,
}

impl ChatMessage {
    /// Create a user message (always complete, single-shot)
    #[must_use]
    pub fn user(
        message_id: MessageId,
        session_id: SessionId,
        user_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            session_id,
            user_id,
            role: MessageRole::User,
            content: content.into(),
            chunk: None,
            is_complete: true,
            timestamp: now_ms(),
        }
    }

    /// Create a non-final assistant emission carrying a chunk
    #[must_use]
    pub fn assistant_chunk(
        message_id: MessageId,
        session_id: SessionId,
        user_id: UserId,
        content: impl Into<String>,
        chunk: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            session_id,
            user_id,
            role: MessageRole::Assistant,
            content: content.into(),
            chunk: Some(chunk.into()),
            is_complete: false,
            timestamp: now_ms(),
        }
    }

    /// Create the final assistant emission
    #[must_use]
    pub fn assistant_final(
        message_id: MessageId,
        session_id: SessionId,
        user_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id,
            session_id,
            user_id,
            role: MessageRole::Assistant,
            content: content.into(),
            chunk: None,
            is_complete: true,
            timestamp: now_ms(),
        }
    }

    /// Encode for the store
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a stored or broadcast payload
    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Get current timestamp in milliseconds
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_id_unique() {
        let a = MessageId::new();
        let b = MessageId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_user_message_is_complete() {
        let msg = ChatMessage::user(
            MessageId::new(),
            SessionId::new("s1"),
            UserId::default(),
            "hello",
        );
        assert_eq!(msg.role, MessageRole::User);
        assert!(msg.is_complete);
        assert!(msg.chunk.is_none());
        assert_eq!(msg.user_id.as_str(), "default_user");
    }

    #[test]
    fn test_wire_format() {
        let msg = ChatMessage {
            message_id: MessageId::from_string("m1"),
            session_id: SessionId::new("s1"),
            user_id: UserId::new("u1"),
            role: MessageRole::Assistant,
            content: "one two".to_string(),
            chunk: Some("two".to_string()),
            is_complete: false,
            timestamp: 42,
        };

        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["message_id"], "m1");
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["chunk"], "two");
        assert_eq!(value["is_complete"], false);
        assert_eq!(value["timestamp"], 42);
    }

    #[test]
    fn test_final_message_omits_chunk() {
        let msg = ChatMessage::assistant_final(
            MessageId::from_string("m1"),
            SessionId::new("s1"),
            UserId::default(),
            "done",
        );
        let json = msg.to_json().unwrap();
        assert!(!json.contains("\"chunk\""));
    }

    #[test]
    fn test_decode_accepts_null_chunk() {
        let payload = r#"{"message_id":"m","session_id":"s","user_id":"u","role":"user","content":"hi","chunk":null,"is_complete":true,"timestamp":1}"#;
        let msg = ChatMessage::from_json(payload).unwrap();
        assert_eq!(msg.content, "hi");
        assert!(msg.chunk.is_none());
    }
}

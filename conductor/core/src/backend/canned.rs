//! Canned Responder
//!
//! A demo generator that picks one of a few prepared answers by keyword and
//! streams it word by word with a small delay, so a deployment can be
//! exercised end to end without a model.

use std::time::Duration;

use async_trait::async_trait;

use super::traits::{word_units, ResponseGenerator, UnitStream};
use super::words::delayed_units;
use crate::error::GenerationError;

/// Default simulated latency per word
pub const DEFAULT_WORD_DELAY: Duration = Duration::from_millis(300);

/// Which prepared answer a prompt selects
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CannedTopic {
    /// Fallback greeting
    General,
    /// How incremental delivery works
    Streaming,
    /// Reloading a page and getting the conversation back
    History,
    /// The store and its pub/sub channels
    PubSub,
    /// The end-to-end request path
    Workflow,
    /// Generic questions
    Question,
}

impl CannedTopic {
    /// Pick a topic from the prompt (case-insensitive keyword match)
    #[must_use]
    pub fn select(prompt: &str) -> Self {
        let prompt = prompt.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| prompt.contains(w));

        if has_any(&["streaming"]) {
            Self::Streaming
        } else if has_any(&["reload", "history", "persistence"]) {
            Self::History
        } else if has_any(&["redis", "pubsub"]) {
            Self::PubSub
        } else if has_any(&["workflow", "flow", "process"]) {
            Self::Workflow
        } else if has_any(&["how", "what", "why", "when", "where"]) {
            Self::Question
        } else {
            Self::General
        }
    }

    /// The prepared answer
    #[must_use]
    pub fn response(&self) -> &'static str {
        match self {
            Self::General => {
                "Hello! I am a demo responder. Ask me about streaming, history, \
                 pub/sub or the request workflow and I will walk you through it."
            }
            Self::Streaming => {
                "Responses are delivered incrementally. Each new word is published \
                 to the session channel together with everything generated so far, \
                 so any client can render the latest content without stitching \
                 pieces together. A final message marks the response complete."
            }
            Self::History => {
                "Every finished message is appended to the session history in the \
                 shared store. After a reload the client subscribes to live updates \
                 first and then reads the history, so nothing produced in between is \
                 lost and duplicates are simply replaced by the latest content."
            }
            Self::PubSub => {
                "The shared store carries three kinds of state: a history list per \
                 session, a pub/sub channel per session for live chunks, and short \
                 lived keys that record the active stream and cancellation requests. \
                 Any process can publish, subscribe or cancel."
            }
            Self::Workflow => {
                "The flow goes like this. The user message is stored and broadcast. \
                 A producer registers the new response as active, then generates it \
                 word by word, checking for cancellation as it goes. When it stops it \
                 publishes and stores one final message and clears its bookkeeping."
            }
            Self::Question => {
                "Good question. In short: state lives in a shared store rather than in \
                 any one process, so producers, relays and cancellers can run anywhere \
                 and still agree on what is streaming and what has been said."
            }
        }
    }
}

/// Keyword-selected demo responses
#[derive(Clone, Debug)]
pub struct CannedResponder {
    word_delay: Duration,
}

impl Default for CannedResponder {
    fn default() -> Self {
        Self {
            word_delay: DEFAULT_WORD_DELAY,
        }
    }
}

impl CannedResponder {
    /// Create a responder with the default per-word delay
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the per-word delay
    #[must_use]
    pub fn with_word_delay(mut self, word_delay: Duration) -> Self {
        self.word_delay = word_delay;
        self
    }
}

#[async_trait]
impl ResponseGenerator for CannedResponder {
    fn name(&self) -> &str {
        "canned"
    }

    async fn generate(&self, prompt: &str) -> Result<UnitStream, GenerationError> {
        let topic = CannedTopic::select(prompt);
        tracing::debug!(topic = ?topic, "Selected canned response");
        Ok(delayed_units(word_units(topic.response()), self.word_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_topic_selection() {
        assert_eq!(CannedTopic::select("Tell me about STREAMING"), CannedTopic::Streaming);
        assert_eq!(CannedTopic::select("what about history?"), CannedTopic::History);
        assert_eq!(CannedTopic::select("redis please"), CannedTopic::PubSub);
        assert_eq!(CannedTopic::select("explain the workflow"), CannedTopic::Workflow);
        assert_eq!(CannedTopic::select("why is the sky blue"), CannedTopic::Question);
        assert_eq!(CannedTopic::select("hi there"), CannedTopic::General);
    }

    #[test]
    fn test_earlier_topics_win() {
        // Mentions both streaming and history; streaming is checked first
        assert_eq!(
            CannedTopic::select("does streaming survive a history reload"),
            CannedTopic::Streaming
        );
    }

    #[tokio::test]
    async fn test_streams_selected_response() {
        let responder = CannedResponder::new().with_word_delay(Duration::ZERO);
        let units: Vec<String> = responder
            .generate("hello")
            .await
            .unwrap()
            .map(|unit| unit.unwrap())
            .collect()
            .await;

        let expected = CannedTopic::General
            .response()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        assert_eq!(units.concat(), expected);
    }
}

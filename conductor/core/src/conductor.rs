//! Conductor - The Caller-Facing Facade
//!
//! The `ChatConductor` is what a request handler talks to. It:
//! - persists and broadcasts user messages
//! - starts response streams and owns their tasks
//! - reads and clears history
//! - forwards cancel requests to the registry
//! - stops every owned stream on shutdown
//!
//! # Design Philosophy
//!
//! The conductor keeps no coordination state of its own. Any number of
//! conductors (in any number of processes) can share one store: a cancel
//! accepted by one reaches a stream started by another. The only thing held
//! in process is task ownership, so that a shutting-down process finalizes
//! its streams instead of abandoning them mid-flight.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backend::ResponseGenerator;
use crate::broadcast::ChunkPublisher;
use crate::config::ConductorConfig;
use crate::error::{ConductorError, StoreError};
use crate::history::HistoryStore;
use crate::messages::{ChatMessage, MessageId, SessionId, UserId};
use crate::registry::{CancelOutcome, StreamRegistry};
use crate::store::{self, SharedStore};
use crate::streaming::{StreamContext, StreamOutcome, StreamProducer};

/// Coordinates user messages, response streams, history and cancellation
pub struct ChatConductor {
    store: Arc<dyn SharedStore>,
    ctx: StreamContext,
    generator: Arc<dyn ResponseGenerator>,
    tasks: Mutex<JoinSet<Option<StreamOutcome>>>,
    shutdown: CancellationToken,
}

impl ChatConductor {
    /// Create a conductor over an existing store
    pub fn new(
        store: Arc<dyn SharedStore>,
        config: &ConductorConfig,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Self {
        let keys = config.key_space();
        let ctx = StreamContext {
            history: HistoryStore::new(store.clone(), keys.clone(), config.history_ttl),
            publisher: ChunkPublisher::new(store.clone(), keys.clone()),
            registry: StreamRegistry::new(store.clone(), keys, config.registry_ttls()),
            settings: config.stream_settings(),
        };
        tracing::debug!(
            store = store.name(),
            generator = generator.name(),
            prefix = config.key_prefix.as_str(),
            "Conductor created"
        );
        Self {
            store,
            ctx,
            generator,
            tasks: Mutex::new(JoinSet::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Create a conductor, connecting to the store named in `config`
    pub fn from_config(
        config: &ConductorConfig,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Result<Self, StoreError> {
        let store = store::connect(config.store_url.as_deref())?;
        Ok(Self::new(store, config, generator))
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    /// History access
    #[must_use]
    pub fn history(&self) -> &HistoryStore {
        &self.ctx.history
    }

    /// Broadcast access (for relays)
    #[must_use]
    pub fn publisher(&self) -> &ChunkPublisher {
        &self.ctx.publisher
    }

    /// Registry access
    #[must_use]
    pub fn registry(&self) -> &StreamRegistry {
        &self.ctx.registry
    }

    /// Whether shutdown has begun
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ========================================================================
    // Caller-facing operations
    // ========================================================================

    /// Persist a user message once and broadcast it once
    ///
    /// Persistence failure is returned; a failed broadcast is only logged.
    pub async fn submit_user_message(
        &self,
        session: &SessionId,
        user: &UserId,
        content: &str,
    ) -> Result<MessageId, ConductorError> {
        let message = ChatMessage::user(MessageId::new(), session.clone(), user.clone(), content);
        self.ctx.history.append(session, &message).await?;
        let delivered = self.ctx.publisher.publish(session, &message).await;
        tracing::info!(
            session_id = %session,
            message_id = %message.message_id,
            delivered,
            "User message submitted"
        );
        Ok(message.message_id)
    }

    /// Start streaming a response for `prompt`
    ///
    /// Returns as soon as the stream is registered; generation continues on
    /// a task owned by this conductor.
    pub async fn start_stream(
        &self,
        session: &SessionId,
        user: &UserId,
        prompt: &str,
    ) -> Result<MessageId, ConductorError> {
        if self.is_shutting_down() {
            return Err(ConductorError::ShuttingDown);
        }

        let mut producer = StreamProducer::new(self.ctx.clone(), session.clone(), user.clone())
            .with_shutdown(self.shutdown.child_token());
        let message_id = producer.register().await?.clone();

        let span = tracing::info_span!("stream", session_id = %session, message_id = %message_id);
        let generator = self.generator.clone();
        let prompt = prompt.to_string();
        let task = async move {
            match producer.run(generator, prompt).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!(error = %e, "Stream could not run");
                    None
                }
            }
        }
        .instrument(span);

        {
            // Shutdown cancels the token before taking the set, so a task
            // spawned under this lock is always joined by shutdown
            let mut tasks = self.tasks.lock();
            if !self.is_shutting_down() {
                while let Some(finished) = tasks.try_join_next() {
                    log_join_result(finished);
                }
                tasks.spawn(task);
                return Ok(message_id);
            }
        }

        tracing::info!(
            session_id = %session,
            message_id = %message_id,
            "Shutdown began during registration; stream not started"
        );
        if let Err(e) = self.ctx.registry.clear_active_if(session, &message_id).await {
            tracing::warn!(
                session_id = %session,
                message_id = %message_id,
                error = %e,
                "Failed to clear active record; TTL will reclaim it"
            );
        }
        Err(ConductorError::ShuttingDown)
    }

    /// Full ordered history of a session
    pub async fn get_history(&self, session: &SessionId) -> Result<Vec<ChatMessage>, ConductorError> {
        Ok(self.ctx.history.read_all(session).await?)
    }

    /// Delete a session's history
    pub async fn clear_history(&self, session: &SessionId) -> Result<(), ConductorError> {
        self.ctx.history.clear(session).await?;
        tracing::info!(session_id = %session, "History cleared");
        Ok(())
    }

    /// Ask a stream to stop
    ///
    /// `false` means a different message is streaming in the session.
    pub async fn cancel(
        &self,
        session: &SessionId,
        message: &MessageId,
    ) -> Result<bool, ConductorError> {
        Ok(self.cancel_detailed(session, message).await?.accepted())
    }

    /// Like [`cancel`](Self::cancel) but reports which path was taken
    pub async fn cancel_detailed(
        &self,
        session: &SessionId,
        message: &MessageId,
    ) -> Result<CancelOutcome, ConductorError> {
        Ok(self.ctx.registry.cancel(session, message).await?)
    }

    // ========================================================================
    // Task ownership
    // ========================================================================

    /// Wait for every owned stream to finish
    ///
    /// Returns the outcomes of the streams joined during this call; streams
    /// that finished earlier may already have been reaped.
    pub async fn wait_idle(&self) -> Vec<StreamOutcome> {
        let mut outcomes = Vec::new();
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                break;
            }
            while let Some(finished) = tasks.join_next().await {
                if let Some(outcome) = log_join_result(finished) {
                    outcomes.push(outcome);
                }
            }
        }
        outcomes
    }

    /// Stop accepting streams and finalize the running ones
    ///
    /// Running streams finish as cancelled at their next loop boundary.
    /// Whatever is still running after `timeout` is aborted and gets no
    /// final message; its active record expires by TTL.
    pub async fn shutdown(&self, timeout: Duration) -> Vec<StreamOutcome> {
        self.shutdown.cancel();
        tracing::info!(timeout_ms = timeout.as_millis() as u64, "Conductor shutting down");

        let deadline = tokio::time::Instant::now() + timeout;
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        let mut outcomes = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(finished)) => outcomes.extend(log_join_result(finished)),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        remaining = tasks.len(),
                        "Shutdown timed out; aborting remaining streams"
                    );
                    tasks.abort_all();
                    while let Some(finished) = tasks.join_next().await {
                        outcomes.extend(log_join_result(finished));
                    }
                    break;
                }
            }
        }
        tracing::info!(streams = outcomes.len(), "Conductor stopped");
        outcomes
    }
}

impl std::fmt::Debug for ChatConductor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConductor")
            .field("store", &self.store.name())
            .field("generator", &self.generator.name())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

fn log_join_result(
    result: Result<Option<StreamOutcome>, tokio::task::JoinError>,
) -> Option<StreamOutcome> {
    match result {
        Ok(outcome) => outcome,
        Err(e) if e.is_cancelled() => {
            tracing::debug!("Stream task aborted");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Stream task panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::WordGenerator;
    use crate::messages::MessageRole;
    use crate::store::MemoryStore;
    use crate::streaming::StreamState;

    fn conductor(store: Arc<MemoryStore>) -> ChatConductor {
        let mut config = ConductorConfig::default();
        config.chunk_interval = Duration::ZERO;
        ChatConductor::new(store, &config, Arc::new(WordGenerator::new()))
    }

    #[tokio::test]
    async fn test_submit_user_message() {
        let conductor = conductor(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");

        let id = conductor
            .submit_user_message(&session, &UserId::default(), "hello")
            .await
            .unwrap();

        let history = conductor.get_history(&session).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].message_id, id);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "hello");
        assert!(history[0].is_complete);
    }

    #[tokio::test]
    async fn test_submit_fails_when_store_offline() {
        let store = Arc::new(MemoryStore::new());
        let conductor = conductor(store.clone());
        store.set_available(false);

        let result = conductor
            .submit_user_message(&SessionId::new("s1"), &UserId::default(), "hello")
            .await;
        assert!(matches!(result, Err(ConductorError::Store(_))));
    }

    #[tokio::test]
    async fn test_start_stream_and_wait() {
        let conductor = conductor(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");

        let id = conductor
            .start_stream(&session, &UserId::default(), "one two three")
            .await
            .unwrap();
        let outcomes = conductor.wait_idle().await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].message_id, id);
        assert_eq!(outcomes[0].state, StreamState::Completed);
        assert_eq!(outcomes[0].final_content, "one two three");
    }

    #[tokio::test]
    async fn test_clear_history() {
        let conductor = conductor(Arc::new(MemoryStore::new()));
        let session = SessionId::new("s1");
        conductor
            .submit_user_message(&session, &UserId::default(), "hello")
            .await
            .unwrap();

        conductor.clear_history(&session).await.unwrap();
        assert!(conductor.get_history(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_streams_after_shutdown() {
        let conductor = conductor(Arc::new(MemoryStore::new()));
        let outcomes = conductor.shutdown(Duration::from_secs(1)).await;
        assert!(outcomes.is_empty());

        let result = conductor
            .start_stream(&SessionId::new("s1"), &UserId::default(), "late")
            .await;
        assert!(matches!(result, Err(ConductorError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_wait_idle_without_streams() {
        let conductor = conductor(Arc::new(MemoryStore::new()));
        assert!(conductor.wait_idle().await.is_empty());
    }
}

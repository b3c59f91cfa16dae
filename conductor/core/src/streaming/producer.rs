//! Stream Producer Implementation
//!
//! Drives one assistant response from registration to its final message.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::backend::ResponseGenerator;
use crate::broadcast::ChunkPublisher;
use crate::error::{GenerationError, StoreError};
use crate::history::HistoryStore;
use crate::messages::{ChatMessage, MessageId, SessionId, UserId};
use crate::registry::StreamRegistry;

/// Appended to the accumulated content of a cancelled response
pub const CANCELLED_MARKER: &str = "\n\n[Cancelled]";

/// Content of the final message when generation fails
pub const STREAM_ERROR_MESSAGE: &str =
    "Sorry, something went wrong while generating this response.";

/// Default pause after each published unit
pub const DEFAULT_CHUNK_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of units between cancellation checks
pub const DEFAULT_CANCEL_CHECK_INTERVAL: u32 = 10;

// ============================================================================
// Configuration
// ============================================================================

/// Pacing of a stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSettings {
    /// Pause after each published unit (zero still yields to the runtime)
    pub chunk_interval: Duration,
    /// Check for cancellation whenever this many units have been emitted
    /// (and before the first); values below 1 are treated as 1
    pub cancel_check_interval: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            chunk_interval: DEFAULT_CHUNK_INTERVAL,
            cancel_check_interval: DEFAULT_CANCEL_CHECK_INTERVAL,
        }
    }
}

impl StreamSettings {
    fn check_every(&self) -> usize {
        self.cancel_check_interval.max(1) as usize
    }
}

/// Shared handles every producer needs
#[derive(Clone, Debug)]
pub struct StreamContext {
    /// Where final messages are persisted
    pub history: HistoryStore,
    /// Where every emission is broadcast
    pub publisher: ChunkPublisher,
    /// Active records and cancellation signals
    pub registry: StreamRegistry,
    /// Pacing
    pub settings: StreamSettings,
}

// ============================================================================
// States
// ============================================================================

/// Why a stream was cancelled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// A cancellation signal was found in the store
    Requested,
    /// The owning process is shutting down
    Shutdown,
}

/// Lifecycle of a producer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    /// Created, not registered
    Idle,
    /// Registered and emitting units
    Streaming,
    /// Every unit was emitted
    Completed,
    /// Stopped early; the final content carries [`CANCELLED_MARKER`]
    Cancelled(CancelReason),
    /// The generator failed; the final content is [`STREAM_ERROR_MESSAGE`]
    Errored,
}

impl StreamState {
    /// Whether the stream has finished
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled(_) | Self::Errored)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Streaming => write!(f, "streaming"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled(CancelReason::Requested) => write!(f, "cancelled"),
            Self::Cancelled(CancelReason::Shutdown) => write!(f, "cancelled (shutdown)"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// How a stream ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamOutcome {
    /// The response's message ID
    pub message_id: MessageId,
    /// Terminal state
    pub state: StreamState,
    /// Units published before the stream ended
    pub units_emitted: usize,
    /// Content of the final message
    pub final_content: String,
}

enum Termination {
    Completed,
    Cancelled(CancelReason),
    Errored(GenerationError),
}

// ============================================================================
// Producer
// ============================================================================

/// Produces one assistant response for a session
pub struct StreamProducer {
    ctx: StreamContext,
    session: SessionId,
    user: UserId,
    message_id: MessageId,
    state: StreamState,
    shutdown: CancellationToken,
}

impl StreamProducer {
    /// Create an idle producer with a fresh message ID
    pub fn new(ctx: StreamContext, session: SessionId, user: UserId) -> Self {
        Self {
            ctx,
            session,
            user,
            message_id: MessageId::new(),
            state: StreamState::Idle,
            shutdown: CancellationToken::new(),
        }
    }

    /// Stop at the next loop boundary when `token` is cancelled
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// ID of the response being produced
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Session being answered
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Record this response as the session's active stream (Idle → Streaming)
    pub async fn register(&mut self) -> Result<&MessageId, StoreError> {
        if self.state == StreamState::Idle {
            self.ctx
                .registry
                .register_active(&self.session, &self.message_id)
                .await?;
            self.state = StreamState::Streaming;
        }
        Ok(&self.message_id)
    }

    /// Generate, publish and finalize the response
    ///
    /// Registers first if that has not happened yet; only that registration
    /// can fail; everything after it degrades to log lines.
    pub async fn run(
        mut self,
        generator: Arc<dyn ResponseGenerator>,
        prompt: String,
    ) -> Result<StreamOutcome, StoreError> {
        self.register().await?;
        let started = Instant::now();
        tracing::info!(
            session_id = %self.session,
            message_id = %self.message_id,
            generator = generator.name(),
            "Stream started"
        );

        let mut content = String::new();
        let mut emitted = 0usize;
        let termination = self
            .stream_units(generator.as_ref(), &prompt, &mut content, &mut emitted)
            .await;

        let outcome = self.finalize(termination, content, emitted).await;
        tracing::info!(
            session_id = %self.session,
            message_id = %self.message_id,
            state = %outcome.state,
            units = outcome.units_emitted,
            duration_ms = started.elapsed().as_millis() as u64,
            "Stream finished"
        );
        Ok(outcome)
    }

    async fn stream_units(
        &self,
        generator: &dyn ResponseGenerator,
        prompt: &str,
        content: &mut String,
        emitted: &mut usize,
    ) -> Termination {
        let started = AssertUnwindSafe(generator.generate(prompt)).catch_unwind().await;
        let mut units = match started {
            Ok(Ok(units)) => units,
            Ok(Err(e)) => return Termination::Errored(e),
            Err(panic) => return Termination::Errored(panicked(generator, panic.as_ref())),
        };
        let check_every = self.ctx.settings.check_every();

        loop {
            if self.shutdown.is_cancelled() {
                return Termination::Cancelled(CancelReason::Shutdown);
            }

            // An exhausted generator completes even if a cancel arrived late
            let unit = match AssertUnwindSafe(units.next()).catch_unwind().await {
                Ok(None) => return Termination::Completed,
                Ok(Some(Err(e))) => return Termination::Errored(e),
                Ok(Some(Ok(unit))) => unit,
                Err(panic) => return Termination::Errored(panicked(generator, panic.as_ref())),
            };

            if *emitted % check_every == 0
                && self
                    .ctx
                    .registry
                    .check_cancel(&self.session, &self.message_id)
                    .await
            {
                return Termination::Cancelled(CancelReason::Requested);
            }

            content.push_str(&unit);
            *emitted += 1;
            let message = ChatMessage::assistant_chunk(
                self.message_id.clone(),
                self.session.clone(),
                self.user.clone(),
                content.as_str(),
                unit,
            );
            let delivered = self.ctx.publisher.publish(&self.session, &message).await;
            tracing::trace!(
                session_id = %self.session,
                message_id = %self.message_id,
                unit = *emitted,
                delivered,
                "Chunk published"
            );

            self.pause().await;
        }
    }

    async fn pause(&self) {
        let interval = self.ctx.settings.chunk_interval;
        if interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(interval).await;
        }
    }

    async fn finalize(
        &mut self,
        termination: Termination,
        content: String,
        emitted: usize,
    ) -> StreamOutcome {
        let (state, final_content) = match termination {
            Termination::Completed => (StreamState::Completed, content),
            Termination::Cancelled(reason) => (
                StreamState::Cancelled(reason),
                format!("{content}{CANCELLED_MARKER}"),
            ),
            Termination::Errored(e) => {
                tracing::error!(
                    session_id = %self.session,
                    message_id = %self.message_id,
                    units = emitted,
                    error = %e,
                    "Generation failed"
                );
                (StreamState::Errored, STREAM_ERROR_MESSAGE.to_string())
            }
        };
        self.state = state;

        let final_message = ChatMessage::assistant_final(
            self.message_id.clone(),
            self.session.clone(),
            self.user.clone(),
            final_content.as_str(),
        );
        self.ctx.publisher.publish(&self.session, &final_message).await;
        if let Err(e) = self.ctx.history.append(&self.session, &final_message).await {
            tracing::warn!(
                session_id = %self.session,
                message_id = %self.message_id,
                error = %e,
                "Failed to persist final message"
            );
        }

        self.cleanup().await;

        StreamOutcome {
            message_id: self.message_id.clone(),
            state,
            units_emitted: emitted,
            final_content,
        }
    }

    /// Drop the active record and the cancel flag; TTLs cover failures
    async fn cleanup(&self) {
        let registry = &self.ctx.registry;
        match registry.clear_active_if(&self.session, &self.message_id).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(
                session_id = %self.session,
                message_id = %self.message_id,
                "Active record already replaced or expired"
            ),
            Err(e) => tracing::warn!(
                session_id = %self.session,
                message_id = %self.message_id,
                error = %e,
                "Failed to clear active record; TTL will reclaim it"
            ),
        }
        if let Err(e) = registry.clear_cancel(&self.session, &self.message_id).await {
            tracing::warn!(
                session_id = %self.session,
                message_id = %self.message_id,
                error = %e,
                "Failed to clear cancel flag; TTL will reclaim it"
            );
        }
    }
}

/// Turn a generator panic into an ordinary generation failure
fn panicked(generator: &dyn ResponseGenerator, payload: &(dyn Any + Send)) -> GenerationError {
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    GenerationError::Failed(format!("generator `{}` panicked: {reason}", generator.name()))
}

impl fmt::Debug for StreamProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamProducer")
            .field("session", &self.session)
            .field("message_id", &self.message_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

//! Stream Conductor - Store-Coordinated Chat Response Streaming
//!
//! This crate delivers incrementally produced chat responses from a producer
//! to any number of relays, keeps a replayable per-session history, and lets
//! anyone cancel a running response. All coordination state lives in a
//! shared key-value store, so producers, relays and cancellers can run in
//! different processes or on different nodes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ChatConductor                            │
//! │   submit_user_message · start_stream · cancel · get/clear history│
//! │                                │                                 │
//! │               owns ┌───────────┴──────────┐                      │
//! │                    │    StreamProducer     │ ◄── ResponseGenerator│
//! │                    │ Idle → Streaming → …  │                      │
//! │                    └───────────┬──────────┘                      │
//! │        ┌───────────────┬───────┴───────┬────────────────┐        │
//! │  HistoryStore   ChunkPublisher   StreamRegistry      relay::attach│
//! └────────┼───────────────┼───────────────┼────────────────┼────────┘
//!          │               │               │                │
//! ┌────────┴───────────────┴───────────────┴────────────────┴────────┐
//! │                  dyn SharedStore (Redis / memory)                 │
//! │  P:history:S (list)  P:stream:S (channel)  P:active:S  P:cancel:S:M│
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatConductor`]: caller-facing facade; owns producer tasks
//! - [`StreamProducer`]: one response's state machine
//! - [`HistoryStore`], [`ChunkPublisher`], [`StreamRegistry`]: store-backed
//!   history, broadcast and active/cancel state
//! - [`SharedStore`]: the store seam, with [`MemoryStore`] and `RedisStore`
//! - [`ReplayBuffer`]: idempotent merge of history and live messages
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use stream_conductor::{
//!     backend::CannedResponder, ChatConductor, ConductorConfig, SessionId, UserId,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConductorConfig::from_env();
//!     let conductor = ChatConductor::from_config(&config, Arc::new(CannedResponder::new()))?;
//!
//!     let session = SessionId::new("demo");
//!     let user = UserId::default();
//!     conductor.submit_user_message(&session, &user, "how does streaming work?").await?;
//!     let reply = conductor.start_stream(&session, &user, "how does streaming work?").await?;
//!
//!     conductor.wait_idle().await;
//!     println!("{reply}: {:?}", conductor.get_history(&session).await?);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`store`]: shared store trait, key layout, Redis and in-memory backends
//! - [`messages`]: wire format and identifiers
//! - [`history`]: per-session append-only log
//! - [`broadcast`]: per-session fan-out
//! - [`registry`]: active-stream records and cancellation signals
//! - [`backend`]: pluggable response generators
//! - [`streaming`]: the stream producer
//! - [`relay`]: ordering-guarded attach and replay buffer
//! - [`conductor`]: the facade
//! - [`config`]: defaults, TOML file, environment and CLI layering
//! - [`error`]: error types

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod broadcast;
pub mod conductor;
pub mod config;
pub mod error;
pub mod history;
pub mod messages;
pub mod registry;
pub mod relay;
pub mod store;
pub mod streaming;

// Re-exports for convenience
pub use backend::{CannedResponder, ResponseGenerator, UnitStream, WordGenerator};
pub use broadcast::{ChunkPublisher, MessageStream};
pub use conductor::ChatConductor;
pub use error::{ConductorError, GenerationError, StoreError};
pub use history::HistoryStore;
pub use messages::{ChatMessage, MessageId, MessageRole, SessionId, UserId};
pub use registry::{CancelOutcome, RegistryTtls, StreamRegistry};
pub use relay::{attach, AttachedSession, ReplayBuffer};
pub use store::{KeySpace, MemoryStore, SharedStore};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use streaming::{
    CancelReason, StreamContext, StreamOutcome, StreamProducer, StreamSettings, StreamState,
    CANCELLED_MARKER, STREAM_ERROR_MESSAGE,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConductorConfig, ConductorToml,
    ConfigError, ConfigOverrides, ConfigSource,
};

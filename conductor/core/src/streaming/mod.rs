//! Stream Production
//!
//! One [`StreamProducer`] drives one assistant response through its
//! lifecycle. Producers share nothing in process; everything they
//! coordinate on lives in the store.
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──register──► Streaming ──┬── units exhausted ──► Completed
//!                        │  ▲      ├── signal / shutdown ─► Cancelled
//!                        │  │      └── generator fault ───► Errored
//!                        ▼  │
//!        every K units: check cancel, then
//!        take unit ─► publish chunk ─► pause
//! ```
//!
//! Every terminal state publishes and persists exactly one final message,
//! then clears the active record (if it is still ours) and the cancel flag.
//!
//! # Example
//!
//! ```ignore
//! use stream_conductor::streaming::{StreamContext, StreamProducer};
//!
//! let mut producer = StreamProducer::new(ctx, session, user);
//! let message_id = producer.register().await?.clone();
//! let outcome = producer.run(generator, prompt).await?;
//! ```

mod producer;

pub use producer::{
    CancelReason, StreamContext, StreamOutcome, StreamProducer, StreamSettings, StreamState,
    CANCELLED_MARKER, DEFAULT_CANCEL_CHECK_INTERVAL, DEFAULT_CHUNK_INTERVAL, STREAM_ERROR_MESSAGE,
};

//! Shared Store
//!
//! Abstraction over the external key-value store all coordination state
//! lives in, plus its two backends.
//!
//! # Architecture
//!
//! ```text
//!   Producer ──┐                         ┌── Relay (subscribe, read_all)
//!              │                         │
//!   Canceller ─┼──► dyn SharedStore ◄────┤
//!              │     ├─ RedisStore       │
//!   Ingress ───┘     └─ MemoryStore      └── Conductor (get/clear history)
//! ```
//!
//! - [`RedisStore`]: multi-process deployments
//! - [`MemoryStore`]: single-process embedding and tests; same TTL and
//!   pub/sub semantics, plus an availability switch to simulate outages

mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;
mod traits;

use std::sync::Arc;

pub use keys::{KeySpace, DEFAULT_KEY_PREFIX};
pub use memory::{MemoryStore, DEFAULT_CHANNEL_CAPACITY};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use traits::{PayloadStream, SharedStore};

use crate::error::StoreError;

/// Build the store named by `url`
///
/// `None` or `memory://` selects the in-process store; anything else is
/// handed to the Redis backend.
pub fn connect(url: Option<&str>) -> Result<Arc<dyn SharedStore>, StoreError> {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        None | Some("memory://") => {
            tracing::info!(backend = "memory", "Shared store initialized");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "redis")]
        Some(url) => {
            let store = RedisStore::open(url)?;
            tracing::info!(backend = "redis", store = ?store, "Shared store initialized");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        Some(url) => Err(StoreError::InvalidConfig(format!(
            "store url {url} requires the `redis` feature"
        ))),
    }
}

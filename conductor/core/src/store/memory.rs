//! In-Memory Store
//!
//! A single-process [`SharedStore`] with the same observable semantics as the
//! Redis backend: keys expire after their TTL, lists keep append order,
//! publish reports how many live subscribers received a payload and drops it
//! when there are none.
//!
//! Expiry is lazy, checked whenever a key is touched, which is what a real
//! store looks like from the outside. The store can also be switched
//! "offline" to exercise the conductor's degraded paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::traits::{PayloadStream, SharedStore};
use crate::error::StoreError;

/// Default per-channel buffer before slow subscribers start lagging
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
enum Value {
    Text(String),
    List(Vec<String>),
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store with TTLs and pub/sub
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    channels: DashMap<String, broadcast::Sender<String>>,
    available: AtomicBool,
    channel_capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create an empty store with a custom per-channel buffer
    #[must_use]
    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            channels: DashMap::new(),
            available: AtomicBool::new(true),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        tracing::debug!(available, "memory store availability changed");
    }

    /// Whether the store currently accepts commands
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of live subscribers on a channel
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }

    fn check_available(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::unavailable(operation, "memory store offline"))
        }
    }

    /// Run `f` against a key that exists and has not expired
    fn with_live<R>(&self, key: &str, f: impl FnOnce(&Entry) -> R) -> Option<R> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now) => return Some(f(&entry)),
            Some(_) => true,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn ping(&self) -> bool {
        self.is_available()
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.check_available("set_with_ttl")?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available("get")?;
        Ok(self
            .with_live(key, |entry| match &entry.value {
                Value::Text(text) => Some(text.clone()),
                Value::List(_) => None,
            })
            .flatten())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available("exists")?;
        Ok(self.with_live(key, |_| ()).is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.check_available("delete")?;
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        self.check_available("delete_if_equals")?;
        let now = Instant::now();
        let removed = self.entries.remove_if(key, |_, entry| {
            !entry.is_expired(now) && matches!(&entry.value, Value::Text(v) if v == expected)
        });
        Ok(removed.is_some())
    }

    async fn append_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<usize, StoreError> {
        self.check_available("append_with_ttl")?;
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::List(Vec::new()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            entry.value = Value::List(Vec::new());
        }
        let len = match &mut entry.value {
            Value::List(items) => {
                items.push(value.to_string());
                items.len()
            }
            Value::Text(_) => {
                return Err(StoreError::unavailable(
                    "append_with_ttl",
                    format!("key {key} holds a non-list value"),
                ));
            }
        };
        entry.expires_at = Some(now + ttl);
        Ok(len)
    }

    async fn range_all(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.check_available("range_all")?;
        Ok(self
            .with_live(key, |entry| match &entry.value {
                Value::List(items) => items.clone(),
                Value::Text(_) => Vec::new(),
            })
            .unwrap_or_default())
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        self.check_available("list_len")?;
        Ok(self
            .with_live(key, |entry| match &entry.value {
                Value::List(items) => items.len(),
                Value::Text(_) => 0,
            })
            .unwrap_or(0))
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        self.check_available("publish")?;
        let delivered = self
            .channels
            .get(channel)
            .map_or(0, |tx| tx.send(payload.to_string()).unwrap_or(0));
        if delivered == 0 {
            self.channels
                .remove_if(channel, |_, tx| tx.receiver_count() == 0);
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, StoreError> {
        self.check_available("subscribe")?;
        let capacity = self.channel_capacity;
        let rx = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        let channel = channel.to_string();
        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            let channel = channel.clone();
            async move {
                match item {
                    Ok(payload) => Some(payload),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            channel = %channel,
                            skipped,
                            "Subscriber lagged; skipped broadcast payloads"
                        );
                        None
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}

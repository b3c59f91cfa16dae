//! Shared Store Trait
//!
//! The conductor never keeps coordination state in process memory. Every
//! piece of shared state (history, active-stream record, cancellation
//! signals) and the broadcast fan-out goes through this trait, so producers,
//! relays and cancellers in different processes see the same thing.
//!
//! # Design Philosophy
//!
//! The trait only exposes atomic single-key operations a key-value store
//! provides natively: set-with-expiry, get, existence check, delete,
//! compare-and-delete, append-with-expiry, range-read, publish, subscribe.
//! Ordering and mutual exclusion come from the store serializing operations
//! per key; callers never need an in-process lock.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;

/// Live payloads delivered to one subscriber of a channel
///
/// The subscription is established before `subscribe` returns; the stream
/// yields raw payloads in publish order and ends when the store connection
/// closes.
pub type PayloadStream = BoxStream<'static, String>;

/// Shared key-value store with pub/sub
///
/// Implement this trait to back the conductor with a different store.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Backend name for logs (e.g. "redis", "memory")
    fn name(&self) -> &str;

    /// Check if the store is reachable
    async fn ping(&self) -> bool;

    /// Set `key` to `value`, expiring after `ttl`
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration)
        -> Result<(), StoreError>;

    /// Read a string key
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Check whether a key exists (and has not expired)
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete `key` only if it currently holds `expected`
    ///
    /// Returns whether the key was deleted.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Append `value` to the list at `key` and (re)set its expiry
    ///
    /// Returns the list length after the append.
    async fn append_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<usize, StoreError>;

    /// Read the whole list at `key` in append order
    async fn range_all(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Length of the list at `key`
    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    /// Publish a payload; returns the number of subscribers that received it
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError>;

    /// Subscribe to a channel
    async fn subscribe(&self, channel: &str) -> Result<PayloadStream, StoreError>;
}

//! Redis backend tests
//!
//! These need a live server and are ignored by default. Run them with:
//!
//! ```text
//! REDIS_URL=redis://127.0.0.1:6379/15 cargo test --test redis_store_tests -- --ignored
//! ```
//!
//! Every test works under a random key prefix so runs never collide.

#![cfg(feature = "redis")]

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use stream_conductor::{
    ChatConductor, ConductorConfig, MessageId, RedisStore, SessionId, SharedStore, StreamState,
    UserId, WordGenerator, CANCELLED_MARKER,
};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string())
}

fn unique_prefix() -> String {
    format!("test-{}", MessageId::new())
}

#[tokio::test]
#[ignore] // Requires a running Redis server
async fn redis_ttl_and_compare_and_delete() {
    let store = RedisStore::open(&redis_url()).unwrap();
    assert!(store.ping().await);
    let key = format!("{}:k", unique_prefix());

    store
        .set_with_ttl(&key, "mine", Duration::from_millis(300))
        .await
        .unwrap();
    assert!(!store.delete_if_equals(&key, "theirs").await.unwrap());
    assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("mine"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!store.exists(&key).await.unwrap());
}

#[tokio::test]
#[ignore] // Requires a running Redis server
async fn redis_list_and_pubsub() {
    let store = RedisStore::open(&redis_url()).unwrap();
    let prefix = unique_prefix();
    let list = format!("{prefix}:list");
    let channel = format!("{prefix}:channel");

    let ttl = Duration::from_secs(30);
    assert_eq!(store.append_with_ttl(&list, "a", ttl).await.unwrap(), 1);
    assert_eq!(store.append_with_ttl(&list, "b", ttl).await.unwrap(), 2);
    assert_eq!(store.range_all(&list).await.unwrap(), vec!["a", "b"]);
    assert_eq!(store.list_len(&list).await.unwrap(), 2);
    assert!(store.delete(&list).await.unwrap());

    assert_eq!(store.publish(&channel, "nobody").await.unwrap(), 0);
    let mut sub = store.subscribe(&channel).await.unwrap();
    assert_eq!(store.publish(&channel, "hello").await.unwrap(), 1);
    let received = tokio::time::timeout(Duration::from_secs(2), sub.next())
        .await
        .unwrap();
    assert_eq!(received.as_deref(), Some("hello"));
}

#[tokio::test]
#[ignore] // Requires a running Redis server
async fn redis_cross_process_cancel() {
    let url = redis_url();
    let mut config = ConductorConfig::default();
    config.key_prefix = unique_prefix();
    config.chunk_interval = Duration::from_millis(20);
    config.cancel_check_interval = 1;

    // Two conductors with separate connections stand in for two processes
    let producer_side = ChatConductor::new(
        Arc::new(RedisStore::open(&url).unwrap()),
        &config,
        Arc::new(WordGenerator::new()),
    );
    let cancel_side = ChatConductor::new(
        Arc::new(RedisStore::open(&url).unwrap()),
        &config,
        Arc::new(WordGenerator::new()),
    );

    let session = SessionId::new("redis-session");
    let prompt = (0..100).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
    let id = producer_side
        .start_stream(&session, &UserId::default(), &prompt)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(cancel_side.cancel(&session, &id).await.unwrap());
    let outcomes = producer_side.wait_idle().await;
    assert_eq!(outcomes[0].state, StreamState::Cancelled(stream_conductor::CancelReason::Requested));
    assert!(outcomes[0].final_content.ends_with(CANCELLED_MARKER));

    let history = cancel_side.get_history(&session).await.unwrap();
    assert_eq!(history.len(), 1);
    cancel_side.clear_history(&session).await.unwrap();
}

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use switchboard_core::{Channel, HistoryMessage, Provider};
use switchboard_store::*;

fn channel(id: i64, priority: i32) -> Channel {
    Channel {
        id,
        name: format!("channel-{id}"),
        provider: Provider::OpenAi,
        endpoint: "https://api.example.com/v1".into(),
        api_key: "sk-test".into(),
        parallelism: 2,
        priority,
        proxy: None,
        timeout_secs: 60,
    }
}

// ---------------------------------------------------------------------------
// Data survives reopening the file
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reopen_keeps_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("switchboard.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        store.upsert_channel(&channel(1, 0)).await.unwrap();
        store.bind_model("gpt-4o", 1).await.unwrap();
        store.set_setting("LLM:MaxRetryCount", "7").await.unwrap();
        store.incr(&inflight_key(1)).await.unwrap();
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    assert_eq!(store.channels_for_model("gpt-4o").await.unwrap().len(), 1);
    assert_eq!(store.get(&inflight_key(1)).await.unwrap(), Some(1));

    let settings = Settings::new(store.clone());
    assert_eq!(settings.max_retry_count().await.unwrap(), 7);
}

// ---------------------------------------------------------------------------
// Two handles on the same file share counters
// ---------------------------------------------------------------------------

#[tokio::test]
async fn counters_are_shared_between_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let a = Arc::new(SqliteStore::open(&path).unwrap());
    let b = Arc::new(SqliteStore::open(&path).unwrap());

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = if i % 2 == 0 { a.clone() } else { b.clone() };
        handles.push(tokio::spawn(async move {
            store.incr("channel:1:inflight").await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert_eq!(a.get("channel:1:inflight").await.unwrap(), Some(20));
    assert_eq!(b.decr("channel:1:inflight").await.unwrap(), 19);
}

// ---------------------------------------------------------------------------
// Registry ordering through the SQLite store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn registry_orders_by_priority() {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    for (id, priority) in [(1, 5), (2, 10), (3, 10)] {
        store.upsert_channel(&channel(id, priority)).await.unwrap();
        store.bind_model("m", id).await.unwrap();
    }
    let registry = ChannelRegistry::new(store);
    let channels = registry.list_channels("m").await.unwrap();
    let ids: Vec<i64> = channels.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![2, 3, 1]);
    assert_eq!(total_parallelism(&channels), 6);
}

// ---------------------------------------------------------------------------
// History windows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_since_and_latest() {
    let store = SqliteStore::in_memory().unwrap();
    let now = Utc::now();
    for (id, minutes_ago, from_bot) in [(1, 300, false), (2, 90, true), (3, 10, false), (4, 5, true)] {
        store
            .record(&HistoryMessage {
                message_id: id,
                chat_id: 42,
                sender_name: if from_bot { "bot".into() } else { "bob".into() },
                content: format!("message {id}"),
                sent_at: now - ChronoDuration::minutes(minutes_ago),
                reply_to: (id == 3).then_some(2),
                from_bot,
            })
            .await
            .unwrap();
    }

    let recent = store
        .messages_since(42, now - ChronoDuration::minutes(60))
        .await
        .unwrap();
    assert_eq!(recent.iter().map(|m| m.message_id).collect::<Vec<_>>(), vec![3, 4]);
    assert_eq!(recent[0].reply_to, Some(2));
    assert!(recent[1].from_bot);

    let latest = store.latest_messages(42, 3).await.unwrap();
    assert_eq!(latest.iter().map(|m| m.message_id).collect::<Vec<_>>(), vec![2, 3, 4]);
    assert_eq!(
        latest[0].sent_at.timestamp_millis(),
        (now - ChronoDuration::minutes(90)).timestamp_millis()
    );
}

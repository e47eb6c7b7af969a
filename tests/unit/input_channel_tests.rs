//! Unit tests for the session input channel.

use std::time::Duration;

use agent_dispatch::input;

#[tokio::test]
async fn initial_prompt_is_pre_enqueued() {
    let (_tx, mut rx) = input::channel("do the thing");
    assert_eq!(rx.pull().await.as_deref(), Some("do the thing"));
}

#[tokio::test]
async fn values_arrive_in_push_order() {
    let (tx, mut rx) = input::channel("first");
    assert!(tx.push("second"));
    assert!(tx.push("third"));

    assert_eq!(rx.pull().await.as_deref(), Some("first"));
    assert_eq!(rx.pull().await.as_deref(), Some("second"));
    assert_eq!(rx.pull().await.as_deref(), Some("third"));
}

#[tokio::test]
async fn pull_suspends_until_a_value_is_pushed() {
    let (tx, mut rx) = input::channel("prompt");
    assert_eq!(rx.pull().await.as_deref(), Some("prompt"));
    assert!(rx.try_pull().is_none(), "queue is empty");

    let consumer = tokio::spawn(async move { rx.pull().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!consumer.is_finished(), "pull must suspend on an empty queue");

    assert!(tx.push("answer"));
    let pulled = tokio::time::timeout(Duration::from_secs(2), consumer)
        .await
        .expect("consumer should wake")
        .expect("consumer task should not panic");
    assert_eq!(pulled.as_deref(), Some("answer"));
}

#[tokio::test]
async fn closed_and_drained_channel_ends_the_sequence() {
    let (tx, mut rx) = input::channel("prompt");
    assert!(tx.push("last"));
    drop(tx);

    assert_eq!(rx.pull().await.as_deref(), Some("prompt"));
    assert_eq!(rx.pull().await.as_deref(), Some("last"));
    assert_eq!(rx.pull().await, None, "drained closed channel is finished");
}

#[tokio::test]
async fn push_after_consumer_gone_reports_failure() {
    let (tx, rx) = input::channel("prompt");
    drop(rx);
    assert!(!tx.push("nobody listening"));
}

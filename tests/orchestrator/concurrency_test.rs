//! Concurrent messages from one phone number.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use absolute_learner::whatsapp::InboundMessage;

use crate::mocks::{Harness, MemoryStore, ScriptedProvider};

const PHONE: &str = "+15550003333";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_hand_out_distinct_topics() {
    let h = Harness::new(MemoryStore::default(), ScriptedProvider::answering("unused"));

    let handles: Vec<_> = (0..5)
        .map(|_| h.orchestrator.spawn(InboundMessage::new(PHONE, "start")))
        .collect();
    for handle in handles {
        handle.await.expect("task should not panic");
    }

    let stored = h.store.get(PHONE).expect("profile exists");
    assert_eq!(stored.history.len(), 5);
    let unique: HashSet<_> = stored.history.iter().collect();
    assert_eq!(unique.len(), 5);
    assert_eq!(h.store.saves.load(Ordering::SeqCst), 5);
    assert_eq!(h.sender.sent().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_phones_progress_independently() {
    let h = Harness::new(MemoryStore::default(), ScriptedProvider::answering("unused"));

    let a = h.orchestrator.spawn(InboundMessage::new("+1000", "hi"));
    let b = h.orchestrator.spawn(InboundMessage::new("+2000", "hi"));
    a.await.expect("task a");
    b.await.expect("task b");

    for phone in ["+1000", "+2000"] {
        let stored = h.store.get(phone).expect("profile exists");
        assert_eq!(stored.history, vec!["Git & GitHub".to_owned()]);
    }
}

#[tokio::test]
async fn drain_waits_for_spawned_messages() {
    let h = Harness::new(
        MemoryStore::default(),
        ScriptedProvider::slow(std::time::Duration::from_millis(100), "done"),
    );

    let _task = h.orchestrator.spawn(InboundMessage::new(PHONE, "question"));
    assert_eq!(h.orchestrator.in_flight(), 1);

    let remaining = h.orchestrator.drain(std::time::Duration::from_secs(5)).await;
    assert_eq!(remaining, 0);
    assert_eq!(h.orchestrator.in_flight(), 0);
    assert_eq!(h.sender.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn drain_gives_up_at_the_deadline() {
    let h = Harness::new(
        MemoryStore::default(),
        ScriptedProvider::slow(std::time::Duration::from_secs(3600), "never"),
    );

    let _task = h.orchestrator.spawn(InboundMessage::new(PHONE, "question"));
    let remaining = h.orchestrator.drain(std::time::Duration::from_secs(1)).await;
    assert_eq!(remaining, 1);
    assert!(h.sender.sent().is_empty());
}

#[tokio::test]
async fn drain_with_nothing_running_returns_immediately() {
    let h = Harness::new(MemoryStore::default(), ScriptedProvider::answering("unused"));
    assert_eq!(h.orchestrator.drain(std::time::Duration::ZERO).await, 0);
}

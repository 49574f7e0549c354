//! Integration tests for the buffered document and committer.

use docsync_engine::{
    BufferedDocument, CommitError, EngineConfig, EngineError, MockCommitHandler, RetryConfig,
};
use docsync_mutation::{DocumentState, Mutation, Snapshot};
use docsync_testkit::prelude::*;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Local(Snapshot),
    Remote(Snapshot),
    Rebase(Snapshot),
    Delete(Snapshot),
}

fn record(doc: &BufferedDocument) -> Arc<Mutex<Vec<Seen>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&seen);
    doc.on_mutation(move |event| {
        let snapshot = event.snapshot.clone();
        log.lock().push(if event.remote {
            Seen::Remote(snapshot)
        } else {
            Seen::Local(snapshot)
        });
    });
    let log = Arc::clone(&seen);
    doc.on_rebase(move |snapshot| log.lock().push(Seen::Rebase(snapshot.clone())));
    let log = Arc::clone(&seen);
    doc.on_delete(move |snapshot| log.lock().push(Seen::Delete(snapshot.clone())));

    seen
}

fn count(snapshot: &Snapshot) -> Option<i64> {
    int_at(snapshot, "count")
}

/// Count a mutation produces when applied to a zeroed counter.
fn effect(mutation: &Mutation) -> Option<i64> {
    count(&mutation.apply(&counter("doc1", 0)))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn counter_increment_commits() {
    init_tracing();
    let handler = MockCommitHandler::new();
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(handler.clone());
    let seen = record(&doc);

    doc.add(inc("doc1", "count", 1));

    assert_eq!(count(&doc.snapshot()), Some(1));
    assert!(matches!(&seen.lock()[..], [Seen::Local(s)] if count(s) == Some(1)));

    doc.commit().unwrap();
    assert_eq!(doc.buffered_len(), 0);
    assert_eq!(count(&doc.snapshot()), Some(1));

    doc.idle().await;

    assert!(doc.commit_queue().is_empty());
    assert_eq!(count(&doc.snapshot()), Some(1));
    assert_eq!(count(&doc.authoritative()), Some(1));
    assert_eq!(handler.attempts(), 1);
    assert_eq!(seen.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_commit_retries_once_then_succeeds() {
    init_tracing();
    let handler = MockCommitHandler::new();
    handler.fail_next(1, CommitError::transient("connection reset"));
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(handler.clone());
    let seen = record(&doc);

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    settle().await;

    let queue = doc.commit_queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].tries(), 1);
    assert!(doc.is_committing());
    assert_eq!(count(&doc.snapshot()), Some(1));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handler.attempts(), 1);

    doc.idle().await;

    let received = handler.received();
    assert_eq!(received.len(), 2);
    assert_ne!(received[0].transaction_id, received[1].transaction_id);
    assert!(doc.commit_queue().is_empty());
    assert_eq!(count(&doc.snapshot()), Some(1));
    assert_eq!(count(&doc.authoritative()), Some(1));

    // Only the optimistic add was visible; the retry changed nothing.
    assert_eq!(seen.lock().len(), 1);

    let stats = doc.stats();
    assert_eq!(stats.commit_attempts, 2);
    assert_eq!(stats.failed_attempts, 1);
    assert_eq!(stats.commits_confirmed, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_commit_is_retried_before_later_commits() {
    let handler = MockCommitHandler::new().with_latency(Duration::from_millis(100));
    handler.fail_next(1, CommitError::transient("timeout"));
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(handler.clone());

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    settle().await;

    doc.add(inc("doc1", "count", 10));
    doc.commit().unwrap();

    doc.idle().await;

    let effects: Vec<_> = handler.received().iter().map(effect).collect();
    assert_eq!(effects, vec![Some(1), Some(1), Some(10)]);
    assert_eq!(handler.max_in_flight(), 1);
    assert_eq!(count(&doc.snapshot()), Some(11));
}

#[tokio::test(start_paused = true)]
async fn only_one_commit_in_flight() {
    let handler = MockCommitHandler::new().with_latency(Duration::from_millis(50));
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(handler.clone());

    for _ in 0..5 {
        doc.add(inc("doc1", "count", 1));
        doc.commit().unwrap();
        doc.perform_commits().unwrap();
    }
    assert_eq!(doc.stats().commits_created, 5);

    doc.idle().await;

    assert_eq!(handler.attempts(), 5);
    assert_eq!(handler.max_in_flight(), 1);
    assert_eq!(count(&doc.authoritative()), Some(5));
}

#[tokio::test(start_paused = true)]
async fn empty_commit_is_noop() {
    let handler = MockCommitHandler::new();
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(handler.clone());
    let seen = record(&doc);

    doc.commit().unwrap();

    assert!(!doc.is_committing());
    assert!(doc.commit_queue().is_empty());
    assert_eq!(doc.stats().commits_created, 0);
    settle().await;
    assert_eq!(handler.attempts(), 0);
    assert!(seen.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn commit_requires_handler() {
    let doc = BufferedDocument::new(counter("doc1", 0));
    doc.add(inc("doc1", "count", 1));

    assert!(matches!(doc.commit(), Err(EngineError::MissingCommitHandler)));
    assert!(matches!(doc.perform_commits(), Err(EngineError::MissingCommitHandler)));
    assert_eq!(doc.buffered_len(), 1);

    let handler = MockCommitHandler::new();
    doc.set_commit_handler(handler.clone());
    doc.commit().unwrap();
    doc.idle().await;

    assert_eq!(handler.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn remote_delete_purges_queue_and_buffer() {
    init_tracing();
    let handler = MockCommitHandler::new();
    handler.fail_next(1, CommitError::transient("unavailable"));
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(handler.clone());

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    settle().await;
    assert_eq!(doc.commit_queue().len(), 1);

    doc.add(inc("doc1", "count", 1));
    assert_eq!(doc.buffered_len(), 1);

    let seen = record(&doc);
    doc.arrive(
        delete("doc1")
            .with_transaction_id("r1")
            .with_previous_rev(INITIAL_REV)
            .with_result_rev("r1"),
    );
    doc.rebase();

    let deletes: Vec<_> = seen
        .lock()
        .iter()
        .filter_map(|seen| match seen {
            Seen::Delete(snapshot) => Some(snapshot.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(deletes.len(), 1);
    assert_eq!(count(&deletes[0]), Some(2));

    assert!(doc.commit_queue().is_empty());
    assert_eq!(doc.buffered_len(), 0);
    assert!(doc.snapshot().is_deleted());

    doc.idle().await;
    assert_eq!(handler.attempts(), 1);
    assert_eq!(doc.stats().deletions, 1);
}

#[tokio::test(start_paused = true)]
async fn echo_of_own_commit_is_silent() {
    let remote = LoopbackRemote::new(counter("doc1", 0));
    let (doc, mut subscription) = remote.client(EngineConfig::new("echo"));

    doc.add(inc("doc1", "count", 3));
    doc.commit().unwrap();
    doc.idle().await;

    let seen = record(&doc);
    assert_eq!(subscription.deliver(&doc), 1);

    assert!(seen.lock().is_empty());
    assert_eq!(doc.inspect_tracker(|tracker| tracker.staged_len()), 0);
    assert_eq!(doc.authoritative(), remote.snapshot());
    assert_eq!(count(&doc.snapshot()), Some(3));
}

#[tokio::test(start_paused = true)]
async fn foreign_edit_fast_path() {
    let remote = LoopbackRemote::new(counter("doc1", 0));
    let (doc, mut subscription) = remote.client(EngineConfig::default());
    let seen = record(&doc);

    remote.foreign(set("doc1", "title", json!("hello")));
    subscription.deliver(&doc);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(matches!(&seen[0], Seen::Remote(s) if s.get("title") == Some(&json!("hello"))));
    assert_eq!(doc.snapshot(), remote.snapshot());
    assert_eq!(doc.stats().remote_mutations, 1);
}

#[tokio::test(start_paused = true)]
async fn foreign_edit_rebases_local_work() {
    let remote = LoopbackRemote::new(counter("doc1", 0));
    let (doc, mut subscription) = remote.client(EngineConfig::default());

    doc.add(set("doc1", "title", json!("draft")));
    let seen = record(&doc);

    remote.foreign(inc("doc1", "count", 5));
    subscription.deliver(&doc);

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    match &seen[0] {
        Seen::Rebase(snapshot) => {
            assert_eq!(count(snapshot), Some(5));
            assert_eq!(snapshot.get("title"), Some(&json!("draft")));
        }
        other => panic!("expected rebase, got {other:?}"),
    }
    assert_eq!(doc.buffered_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_clients_converge() {
    init_tracing();
    let remote = LoopbackRemote::new(counter("doc1", 0));
    let (alice, mut alice_feed) = remote.client(EngineConfig::new("alice"));
    let (bob, mut bob_feed) = remote.client(EngineConfig::new("bob"));

    alice.add(inc("doc1", "count", 1));
    alice.add(set("doc1", "title", json!("alice")));
    bob.add(inc("doc1", "count", 10));

    alice.commit().unwrap();
    bob.commit().unwrap();
    alice.idle().await;
    bob.idle().await;

    alice_feed.deliver(&alice);
    bob_feed.deliver(&bob);

    let expected = remote.snapshot();
    assert_eq!(count(&expected), Some(11));
    assert_eq!(body(&alice.snapshot()), body(&expected));
    assert_eq!(body(&bob.snapshot()), body(&expected));
    assert_eq!(alice.inspect_tracker(|t| t.staged_len()), 0);
    assert_eq!(bob.inspect_tracker(|t| t.staged_len()), 0);
}

#[tokio::test(start_paused = true)]
async fn offline_commits_go_through_when_remote_returns() {
    let remote = LoopbackRemote::new(counter("doc1", 0));
    let (doc, _subscription) = remote.client(EngineConfig::default());
    remote.set_offline(true);

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    assert_eq!(remote.rejected(), 3);
    assert!(doc.is_committing());
    assert_eq!(doc.commit_queue()[0].tries(), 3);
    assert_eq!(count(&doc.snapshot()), Some(1));

    remote.set_offline(false);
    doc.idle().await;

    assert_eq!(remote.log().len(), 1);
    assert_eq!(count(&remote.snapshot()), Some(1));
}

#[tokio::test(start_paused = true)]
async fn out_of_order_arrivals_wait_for_gap() {
    let remote = LoopbackRemote::new(counter("doc1", 0));
    let doc = BufferedDocument::new(remote.snapshot());

    let first = remote.foreign(inc("doc1", "count", 1));
    let second = remote.foreign(inc("doc1", "count", 2));

    doc.arrive(second);
    assert_eq!(count(&doc.snapshot()), Some(0));
    assert_eq!(doc.inspect_tracker(|t| t.pending_arrivals()), 1);

    doc.arrive(first);
    assert_eq!(count(&doc.snapshot()), Some(3));
    assert_eq!(doc.inspect_tracker(|t| t.pending_arrivals()), 0);
    assert_eq!(doc.snapshot(), remote.snapshot());
}

#[tokio::test(start_paused = true)]
async fn encoded_arrival() {
    let remote = LoopbackRemote::new(counter("doc1", 0));
    let doc = BufferedDocument::new(remote.snapshot());

    let bytes = remote.foreign(inc("doc1", "count", 4)).encode().unwrap();
    doc.arrive_encoded(&bytes).unwrap();

    assert_eq!(count(&doc.snapshot()), Some(4));
    assert!(doc.arrive_encoded(b"not cbor").is_err());
}

#[tokio::test(start_paused = true)]
async fn reset_preserves_pending_work() {
    let handler = MockCommitHandler::new();
    handler.fail_next(1, CommitError::transient("busy"));
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(handler.clone());

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    settle().await;
    doc.add(inc("doc1", "count", 1));
    let seen = record(&doc);

    doc.reset(
        DocumentState::from_json("doc1", json!({ "count": 40 }))
            .with_rev("r9")
            .into(),
    );

    assert_eq!(doc.commit_queue().len(), 1);
    assert_eq!(doc.buffered_len(), 1);
    assert_eq!(count(&doc.snapshot()), Some(42));
    assert!(matches!(&seen.lock()[..], [Seen::Rebase(s)] if count(s) == Some(42)));

    doc.idle().await;
    assert_eq!(count(&doc.authoritative()), Some(41));
}

#[tokio::test(start_paused = true)]
async fn retry_limit_abandons_commit() {
    let handler = MockCommitHandler::new();
    handler.fail_next(5, CommitError::transient("rejected"));
    let config = EngineConfig::new("limited").with_retry(RetryConfig::default().with_max_attempts(2));
    let doc = BufferedDocument::with_config(counter("doc1", 0), config)
        .with_commit_handler(handler.clone());

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    let seen = record(&doc);
    doc.idle().await;

    assert_eq!(handler.attempts(), 2);
    assert_eq!(doc.stats().commits_abandoned, 1);
    assert!(doc.commit_queue().is_empty());
    assert_eq!(count(&doc.snapshot()), Some(0));
    assert!(matches!(&seen.lock()[..], [Seen::Rebase(s)] if count(s) == Some(0)));
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_are_not_retried_when_honored() {
    let handler = MockCommitHandler::new();
    handler.fail_next(1, CommitError::permanent("validation failed"));
    let config =
        EngineConfig::default().with_retry(RetryConfig::unconditional().honoring_retryable());
    let doc = BufferedDocument::with_config(counter("doc1", 0), config)
        .with_commit_handler(handler.clone());

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    doc.idle().await;

    assert_eq!(handler.attempts(), 1);
    assert_eq!(doc.stats().commits_abandoned, 1);
    assert_eq!(count(&doc.snapshot()), Some(0));
}

#[tokio::test(start_paused = true)]
async fn closure_commit_handler() {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&sent);
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(
        move |mutation: Mutation| {
            log.lock().push(mutation);
            async { Ok::<(), CommitError>(()) }
        },
    );

    doc.add(inc("doc1", "count", 2));
    doc.commit().unwrap();
    doc.idle().await;

    let sent = sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(effect(&sent[0]), Some(2));
    assert!(sent[0].transaction_id.is_some());
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_fails_the_attempt() {
    init_tracing();
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let sent = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&sent);
    let counter_calls = Arc::clone(&calls);
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(
        move |mutation: Mutation| {
            if counter_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                panic!("handler blew up");
            }
            log.lock().push(mutation);
            async { Ok::<(), CommitError>(()) }
        },
    );

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    settle().await;
    assert!(doc.is_committing());
    assert_eq!(doc.commit_queue().len(), 1);

    doc.idle().await;
    assert!(!doc.is_committing());

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    doc.idle().await;

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(sent.lock().len(), 2);
    assert!(doc.commit_queue().is_empty());
    assert!(!doc.is_committing());
    assert_eq!(count(&doc.authoritative()), Some(2));
    assert_eq!(count(&doc.snapshot()), Some(2));
    assert_eq!(doc.stats().failed_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn delete_during_in_flight_commit_drops_it() {
    init_tracing();
    let handler = MockCommitHandler::new().with_latency(Duration::from_millis(100));
    handler.fail_next(1, CommitError::transient("timeout"));
    let doc = BufferedDocument::new(counter("doc1", 0)).with_commit_handler(handler.clone());

    doc.add(inc("doc1", "count", 1));
    doc.commit().unwrap();
    settle().await;
    assert!(doc.commit_queue().is_empty());
    assert_eq!(doc.inspect_tracker(|t| t.staged_len()), 1);

    let seen = record(&doc);
    doc.arrive(
        delete("doc1")
            .with_transaction_id("r1")
            .with_previous_rev(INITIAL_REV)
            .with_result_rev("r1"),
    );
    doc.idle().await;

    assert_eq!(handler.attempts(), 1);
    let deletes: Vec<_> = seen
        .lock()
        .iter()
        .filter_map(|seen| match seen {
            Seen::Delete(snapshot) => Some(snapshot.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(deletes.len(), 1);
    assert_eq!(count(&deletes[0]), Some(1));

    assert!(doc.snapshot().is_deleted());
    assert_eq!(doc.inspect_tracker(|t| t.staged_len()), 0);
    assert!(doc.commit_queue().is_empty());
    assert_eq!(doc.stats().commits_abandoned, 0);
    assert_eq!(doc.stats().deletions, 1);
}

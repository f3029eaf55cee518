use std::sync::{Arc, Mutex};
use std::time::Duration;

use notetally_daemon::lock::{marker_key, ListLock, LockConfig, LockError, LockMarker};
use notetally_daemon::store::MemoryObjectStore;
use tokio::time::Instant;

type Interval = (String, Instant, Instant);

/// Acquire, hold for `hold`, release; record when the lock was held.
async fn hold_lock(
    store: MemoryObjectStore,
    holder: &'static str,
    hold: Duration,
    log: Arc<Mutex<Vec<Interval>>>,
) {
    let lock = ListLock::new(store, LockConfig::default());
    lock.acquire(holder, Duration::from_secs(30)).await.expect("lock should be acquired");
    let acquired = Instant::now();
    tokio::time::sleep(hold).await;
    let released = Instant::now();
    lock.release(holder).await.expect("release should succeed");
    log.lock().expect("log lock should not be poisoned").push((holder.to_string(), acquired, released));
}

#[tokio::test(start_paused = true)]
async fn two_acquirers_never_hold_the_lock_together() {
    let store = MemoryObjectStore::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let first = tokio::spawn(hold_lock(store.clone(), "node-a", Duration::from_secs(2), log.clone()));
    let second = tokio::spawn(hold_lock(store.clone(), "node-b", Duration::from_secs(2), log.clone()));
    first.await.expect("first task should finish");
    second.await.expect("second task should finish");

    let mut intervals = log.lock().expect("log lock should not be poisoned").clone();
    intervals.sort_by_key(|(_, acquired, _)| *acquired);
    assert_eq!(intervals.len(), 2);
    assert_ne!(intervals[0].0, intervals[1].0);
    assert!(
        intervals[0].2 <= intervals[1].1,
        "holders overlapped: {} released after {} acquired",
        intervals[0].0,
        intervals[1].0
    );
    assert!(store.keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn waiter_wins_after_holder_releases() {
    let store = MemoryObjectStore::new();
    let holder = ListLock::new(store.clone(), LockConfig::default());
    holder.acquire("node-a", Duration::from_secs(5)).await.expect("first acquire should succeed");

    let waiter_store = store.clone();
    let waiter = tokio::spawn(async move {
        let lock = ListLock::new(waiter_store, LockConfig::default());
        lock.acquire("node-b", Duration::from_secs(30)).await
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!waiter.is_finished());
    holder.release("node-a").await.expect("release should succeed");

    let grant = waiter.await.expect("waiter should finish").expect("waiter should win");
    assert_eq!(grant.holder, "node-b");
    assert!(grant.attempts > 2);
    assert!(grant.elapsed >= Duration::from_secs(5));

    let body = store.read(&marker_key("node-b")).expect("marker should exist");
    let marker: LockMarker = serde_json::from_slice(&body).expect("marker should be JSON");
    assert_eq!(marker.client_id, "node-b");
}

#[tokio::test(start_paused = true)]
async fn racing_markers_are_withdrawn_and_one_holder_wins() {
    let store = MemoryObjectStore::new();
    // Both holders wrote into the same empty window.
    store.insert(marker_key("node-a"), "{}");
    store.insert(marker_key("node-b"), "{}");

    let spawn_acquire = |holder: &'static str| {
        let store = store.clone();
        tokio::spawn(async move {
            ListLock::new(store, LockConfig::default()).acquire(holder, Duration::from_secs(3)).await
        })
    };
    let a = spawn_acquire("node-a");
    let b = spawn_acquire("node-b");
    let results = [
        ("node-a", a.await.expect("task a should finish")),
        ("node-b", b.await.expect("task b should finish")),
    ];

    let winners: Vec<&str> =
        results.iter().filter(|(_, result)| result.is_ok()).map(|(holder, _)| *holder).collect();
    assert_eq!(winners.len(), 1, "exactly one holder should win: {results:?}");
    let winner = winners[0];

    for (holder, result) in &results {
        if *holder != winner {
            assert!(
                matches!(result, Err(LockError::Timeout { holders, .. }) if holders == &[winner]),
                "loser should time out behind the winner: {result:?}"
            );
        }
    }
    assert_eq!(store.keys(), vec![marker_key(winner)]);
}

#[tokio::test(start_paused = true)]
async fn stale_foreign_marker_blocks_until_unlocked() {
    let store = MemoryObjectStore::new();
    store.insert(marker_key("crashed"), "{}");
    let lock = ListLock::new(store.clone(), LockConfig::default());

    let err = lock.acquire("node-a", Duration::from_secs(4)).await.expect_err("should time out");
    assert!(matches!(err, LockError::Timeout { ref holders, .. } if holders == &["crashed"]));

    // Manual unlock of the stale marker.
    lock.release("crashed").await.expect("unlock should succeed");
    lock.acquire("node-a", Duration::from_secs(4)).await.expect("lock should now be free");
}

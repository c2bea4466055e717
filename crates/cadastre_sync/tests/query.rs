// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for the query runner.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use cadastre_sync::{CacheKey, CacheStore, EntryStatus, Error, KeyFamily, QueryRunner, QuerySpec, Readiness};

/// Lets spawned fetch and supervisor tasks run without advancing the clock.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn runner() -> QueryRunner {
    QueryRunner::new(Arc::new(CacheStore::new()), Readiness::always())
}

fn spec(key: &CacheKey) -> QuerySpec {
    QuerySpec::new(key.clone(), Duration::from_secs(25), None)
}

#[tokio::test(start_paused = true)]
async fn initial_load_populates_the_entry() {
    let runner = runner();
    let key = CacheKey::root("landRecords");
    let calls = Arc::new(AtomicUsize::new(0));

    let fetcher = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(vec!["P-1".to_string()])
            }
        }
    };

    let mut handle = runner.subscribe(spec(&key), fetcher);
    let records = handle.settled().await.expect("fetch succeeds");

    assert_eq!(records.as_slice(), ["P-1".to_string()]);
    assert_eq!(handle.state().status, EntryStatus::Ready);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_subscribers_share_one_fetch() {
    let runner = runner();
    let key = CacheKey::new(["landRecord", "P-1"]);
    let calls = Arc::new(AtomicUsize::new(0));

    let fetcher = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, Error>(7_u32)
            }
        }
    };

    // Both attach within the same tick, while no entry exists.
    let mut first = runner.subscribe(spec(&key), fetcher.clone());
    let mut second = runner.subscribe(spec(&key), fetcher);

    let a = first.settled().await.expect("fetch succeeds");
    let b = second.settled().await.expect("fetch succeeds");

    assert_eq!(*a, 7);
    assert_eq!(*b, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "joiners must not start a second fetch");
}

#[tokio::test(start_paused = true)]
async fn invalidation_serves_the_old_value_while_refetching() {
    let runner = runner();
    let key = CacheKey::root("landRecords");
    let calls = Arc::new(AtomicUsize::new(0));

    let fetcher = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok::<_, Error>(call as u32)
            }
        }
    };

    let mut handle = runner.subscribe(spec(&key), fetcher);
    assert_eq!(*handle.settled().await.expect("first fetch succeeds"), 1);

    runner.store().invalidate(&KeyFamily::root("landRecords"));
    settle().await;

    // Stale-while-revalidate: the old value is still served, marked refreshing.
    let state = handle.state();
    assert_eq!(state.value.as_deref(), Some(&1));
    assert_eq!(state.status, EntryStatus::Refreshing);
    assert!(state.refreshing);

    assert_eq!(*handle.settled().await.expect("refetch succeeds"), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn periodic_refresh_runs_only_while_subscribed() {
    let runner = runner();
    let key = CacheKey::root("pendingTransfers");
    let calls = Arc::new(AtomicUsize::new(0));

    let fetcher = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move { Ok::<_, Error>(calls.fetch_add(1, Ordering::SeqCst) as u32 + 1) }
        }
    };

    let query = QuerySpec::new(key.clone(), Duration::from_secs(3), Some(Duration::from_secs(5)));
    let handle = runner.subscribe(query, fetcher);
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // After the last subscriber detaches no further ticks are scheduled.
    drop(handle);
    settle().await;
    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn fresh_attach_does_not_refetch_but_stale_attach_does() {
    let runner = runner();
    let key = CacheKey::root("userProfile");
    let calls = Arc::new(AtomicUsize::new(0));

    let fetcher = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move { Ok::<_, Error>(calls.fetch_add(1, Ordering::SeqCst) as u32 + 1) }
        }
    };

    let query = QuerySpec::new(key.clone(), Duration::from_secs(10), None);
    let handle = runner.subscribe(query.clone(), fetcher.clone());
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    drop(handle);
    settle().await;

    // Within the staleness window the cached value is served as-is.
    let handle = runner.subscribe(query.clone(), fetcher.clone());
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(handle.state().value.as_deref(), Some(&1));
    drop(handle);
    settle().await;

    // Past the window, attaching serves the old value and refreshes it.
    tokio::time::advance(Duration::from_secs(11)).await;
    let mut handle = runner.subscribe(query, fetcher);
    let state = handle.state();
    assert_eq!(state.value.as_deref(), Some(&1));
    assert_eq!(state.status, EntryStatus::Refreshing);

    assert_eq!(*handle.settled().await.expect("refresh succeeds"), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn a_failed_refresh_keeps_the_cached_value() {
    let runner = runner();
    let key = CacheKey::root("landRecords");
    let calls = Arc::new(AtomicUsize::new(0));

    let fetcher = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 => Ok(41_u32),
                    _ => Err(Error::transport("registry unreachable")),
                }
            }
        }
    };

    let mut handle = runner.subscribe(spec(&key), fetcher);
    assert_eq!(*handle.settled().await.expect("first fetch succeeds"), 41);

    runner.store().invalidate(&KeyFamily::root("landRecords"));
    settle().await;

    let state = handle.state();
    assert_eq!(state.status, EntryStatus::Error);
    assert_eq!(state.error, Some(Error::transport("registry unreachable")));
    assert_eq!(state.value.as_deref(), Some(&41), "errors never clear cached data");
}

#[tokio::test(start_paused = true)]
async fn a_not_ready_session_is_surfaced_without_a_remote_call() {
    let ready = Arc::new(AtomicBool::new(false));
    let readiness = {
        let ready = Arc::clone(&ready);
        Readiness::new(move || ready.load(Ordering::SeqCst))
    };
    let runner = QueryRunner::new(Arc::new(CacheStore::new()), readiness);
    let key = CacheKey::root("landRecords");
    let calls = Arc::new(AtomicUsize::new(0));

    let fetcher = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(1_u32)
            }
        }
    };

    let mut handle = runner.subscribe(spec(&key), fetcher);
    assert_eq!(handle.state().status, EntryStatus::Error);
    assert_eq!(handle.state().error, Some(Error::NotReady));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no call may reach the remote");

    // Once the session is ready, the next trigger recovers.
    ready.store(true, Ordering::SeqCst);
    runner.store().invalidate(&KeyFamily::root("landRecords"));
    settle().await;
    assert_eq!(*handle.settled().await.expect("fetch succeeds"), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn focus_refetch_is_staleness_gated() {
    let runner = runner();
    let key = CacheKey::root("landRecords");
    let calls = Arc::new(AtomicUsize::new(0));

    let fetcher = {
        let calls = Arc::clone(&calls);
        move || {
            let calls = Arc::clone(&calls);
            async move { Ok::<_, Error>(calls.fetch_add(1, Ordering::SeqCst) as u32 + 1) }
        }
    };

    let query = QuerySpec::new(key.clone(), Duration::from_secs(5), None).refetch_on_focus(true);
    let _handle = runner.subscribe(query, fetcher);
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    runner.focus_regained();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "fresh entries are not refetched on focus");

    tokio::time::advance(Duration::from_secs(6)).await;
    runner.focus_regained();
    settle().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn an_abandoned_fetch_still_commits_its_result() {
    let runner = runner();
    let key = CacheKey::root("landRecords");

    let fetcher = move || async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, Error>(9_u32)
    };

    let handle = runner.subscribe(spec(&key), fetcher);
    drop(handle);

    tokio::time::advance(Duration::from_millis(60)).await;
    settle().await;

    let entry = runner.store().peek(&key).expect("entry exists");
    assert_eq!(entry.status(), EntryStatus::Ready);
    assert_eq!(entry.value_as::<u32>().as_deref(), Some(&9));
}

#[tokio::test(start_paused = true)]
async fn writes_to_one_key_do_not_notify_another() {
    let runner = runner();
    let a = CacheKey::new(["landRecord", "A"]);
    let b = CacheKey::new(["landRecord", "B"]);

    let mut handle_a = runner.subscribe(spec(&a), || async { Ok::<_, Error>(1_u32) });
    let mut handle_b = runner.subscribe(spec(&b), || async { Ok::<_, Error>(2_u32) });
    assert_eq!(*handle_a.settled().await.expect("fetch succeeds"), 1);
    assert_eq!(*handle_b.settled().await.expect("fetch succeeds"), 2);

    let mut watch_b = runner.store().watch(&b);
    runner.store().invalidate(&a.clone().into());
    settle().await;

    assert!(!watch_b.has_changed().expect("channel open"));
    assert_eq!(handle_b.state().status, EntryStatus::Ready);
}

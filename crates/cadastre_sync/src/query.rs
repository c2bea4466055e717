// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The query runner: fetch-and-refresh driving for registered cache keys.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

use cadastre_remote::Error;

use crate::{CacheEntry, CacheKey, CacheStore, EntryStatus, SharedValue};

/// Predicate gating remote calls on session readiness.
///
/// The runners evaluate this before issuing any call; while it returns
/// `false` they record [`Error::NotReady`] instead of touching the remote.
/// This replaces ad hoc null checks scattered through call sites with one
/// explicit dependency.
#[derive(Clone)]
pub struct Readiness(Arc<dyn Fn() -> bool + Send + Sync>);

impl Readiness {
    /// Creates a readiness predicate from a closure.
    pub fn new(probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(probe))
    }

    /// A predicate that is always ready.
    #[must_use]
    pub fn always() -> Self {
        Self::new(|| true)
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        (self.0)()
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Readiness").finish_non_exhaustive()
    }
}

/// Per-key query policy, declared explicitly at registration.
///
/// Volatile collections refresh aggressively (seconds); rarely-changing
/// aggregates refresh on the order of tens of seconds. Both the staleness
/// window and the polling interval must be stated for every registered
/// query; there is no global default.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use cadastre_sync::{CacheKey, QuerySpec};
///
/// let spec = QuerySpec::new(
///     CacheKey::root("pendingTransfers"),
///     Duration::from_secs(3),
///     Some(Duration::from_secs(5)),
/// )
/// .refetch_on_focus(true);
///
/// assert_eq!(spec.stale_after(), Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct QuerySpec {
    key: CacheKey,
    stale_after: Duration,
    refresh_interval: Option<Duration>,
    refetch_on_focus: bool,
}

impl QuerySpec {
    /// Declares a query over `key` with its staleness window and polling
    /// interval (`None` disables background polling).
    #[must_use]
    pub fn new(key: CacheKey, stale_after: Duration, refresh_interval: Option<Duration>) -> Self {
        Self {
            key,
            stale_after,
            refresh_interval,
            refetch_on_focus: false,
        }
    }

    /// Also refetch when the UI regains focus and the entry is stale.
    #[must_use]
    pub fn refetch_on_focus(mut self, on: bool) -> Self {
        self.refetch_on_focus = on;
        self
    }

    /// The cache key this query populates.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// How old a fetched value may grow before it is considered stale.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// Background polling interval while at least one subscriber is active.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }

    /// Whether focus regain triggers a staleness-gated refetch.
    #[must_use]
    pub fn focus_refetch(&self) -> bool {
        self.refetch_on_focus
    }
}

type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<SharedValue, Error>> + Send + Sync>;

/// One registered query key: its policy, its fetcher, and who is attached.
struct Registration {
    spec: QuerySpec,
    fetcher: Fetcher,
    subscribers: AtomicUsize,
    membership_changed: Notify,
    supervised: AtomicBool,
}

impl Registration {
    fn new(spec: QuerySpec, fetcher: Fetcher) -> Self {
        Self {
            spec,
            fetcher,
            subscribers: AtomicUsize::new(0),
            membership_changed: Notify::new(),
            supervised: AtomicBool::new(false),
        }
    }

    fn claim_supervisor(&self) -> bool {
        self.supervised
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release_supervisor(&self) {
        self.supervised.store(false, Ordering::SeqCst);
    }
}

/// Drives fetch-and-refresh for registered cache keys.
///
/// For every key with at least one active subscriber the runner keeps a
/// supervisor task alive that refetches on invalidation marks and on the
/// key's polling interval. Attaching a subscriber triggers the initial load
/// (entry absent) or a staleness-gated background refresh (entry present but
/// old); concurrent attachments join the single in-flight fetch for the key
/// and receive the same eventual result.
///
/// Detaching the last subscriber stops the supervisor, so no further fetch is
/// scheduled; a fetch already in flight is not aborted and its result is
/// still committed to the store for whoever re-attaches.
pub struct QueryRunner {
    store: Arc<CacheStore>,
    readiness: Readiness,
    registry: Mutex<HashMap<CacheKey, Arc<Registration>>>,
}

impl fmt::Debug for QueryRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRunner")
            .field("registered", &self.registry.lock().len())
            .finish_non_exhaustive()
    }
}

impl QueryRunner {
    /// Creates a runner over the given store and readiness predicate.
    #[must_use]
    pub fn new(store: Arc<CacheStore>, readiness: Readiness) -> Self {
        Self {
            store,
            readiness,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// The store this runner writes fetched values into.
    #[must_use]
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Attaches a subscriber to `spec`'s key, registering the query on first
    /// attach.
    ///
    /// A later `subscribe` for an already registered key joins it: the
    /// original policy and fetcher stay in force for as long as the
    /// registration lives, and an in-flight fetch is shared rather than
    /// duplicated.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, which is needed to spawn
    /// the fetch and supervisor tasks.
    pub fn subscribe<T, F, Fut>(&self, spec: QuerySpec, fetcher: F) -> QueryHandle<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let boxed: Fetcher = Arc::new(move || {
            let fut = fetcher();
            async move { fut.await.map(|value| Arc::new(value) as SharedValue) }.boxed()
        });

        let key = spec.key().clone();
        let reg = {
            let mut registry = self.registry.lock();
            Arc::clone(
                registry
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Registration::new(spec, boxed))),
            )
        };

        let rx = self.store.watch(&key);
        reg.subscribers.fetch_add(1, Ordering::SeqCst);
        reg.membership_changed.notify_waiters();

        let entry = self.store.entry(&key);
        if entry.value().is_none() || entry.is_stale(reg.spec.stale_after()) {
            Self::start_fetch(&self.store, &self.readiness, &reg);
        }

        if reg.claim_supervisor() {
            Self::spawn_supervisor(Arc::clone(&self.store), self.readiness.clone(), Arc::clone(&reg));
        }

        QueryHandle {
            rx,
            guard: SubscriberGuard { reg },
            _marker: PhantomData,
        }
    }

    /// Triggers a staleness-gated refetch for every focus-sensitive query
    /// with active subscribers.
    pub fn focus_regained(&self) {
        let regs: Vec<Arc<Registration>> = self.registry.lock().values().map(Arc::clone).collect();
        for reg in regs {
            if !reg.spec.focus_refetch() || reg.subscribers.load(Ordering::SeqCst) == 0 {
                continue;
            }
            if self.store.entry(reg.spec.key()).is_stale(reg.spec.stale_after()) {
                tracing::debug!(key = %reg.spec.key(), "focus refetch");
                Self::start_fetch(&self.store, &self.readiness, &reg);
            }
        }
    }

    /// Starts a fetch for the registration's key unless one is in flight.
    ///
    /// A not-ready session records `Error::NotReady` without issuing a call.
    fn start_fetch(store: &Arc<CacheStore>, readiness: &Readiness, reg: &Arc<Registration>) {
        let key = reg.spec.key();
        let Some(token) = store.begin_fetch(key) else {
            return;
        };
        if !readiness.is_ready() {
            store.fail_fetch(key, token, Error::NotReady);
            return;
        }

        let fut = (reg.fetcher)();
        let store = Arc::clone(store);
        let key = key.clone();
        tokio::spawn(async move {
            match fut.await {
                Ok(value) => store.complete_fetch(&key, token, value),
                Err(error) => store.fail_fetch(&key, token, error),
            }
        });
    }

    fn spawn_supervisor(store: Arc<CacheStore>, readiness: Readiness, reg: Arc<Registration>) {
        tokio::spawn(async move {
            loop {
                supervise(&store, &readiness, &reg).await;
                reg.release_supervisor();
                // A subscriber may have attached between our last count read
                // and the release; reclaim rather than strand it.
                if reg.subscribers.load(Ordering::SeqCst) > 0 && reg.claim_supervisor() {
                    continue;
                }
                break;
            }
        });
    }
}

/// Per-key supervision: refetch on invalidation marks and interval ticks
/// while at least one subscriber is attached.
async fn supervise(store: &Arc<CacheStore>, readiness: &Readiness, reg: &Arc<Registration>) {
    let mut rx = store.watch(reg.spec.key());

    // An invalidation may have landed before this task observed the channel.
    let entry = store.entry(reg.spec.key());
    if entry.is_invalidated() && !entry.is_fetching() {
        QueryRunner::start_fetch(store, readiness, reg);
    }

    let mut poll = reg.spec.refresh_interval().map(|every| {
        let mut interval = interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        if reg.subscribers.load(Ordering::SeqCst) == 0 {
            return;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
                let wants_refetch = {
                    let entry = rx.borrow_and_update();
                    entry.is_invalidated() && !entry.is_fetching()
                };
                if wants_refetch {
                    QueryRunner::start_fetch(store, readiness, reg);
                }
            }
            () = next_tick(&mut poll) => {
                QueryRunner::start_fetch(store, readiness, reg);
            }
            () = reg.membership_changed.notified() => {}
        }
    }
}

async fn next_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// RAII attachment of one subscriber; dropping detaches.
struct SubscriberGuard {
    reg: Arc<Registration>,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.reg.subscribers.fetch_sub(1, Ordering::SeqCst);
        self.reg.membership_changed.notify_waiters();
    }
}

/// Typed view of one query's cache entry.
pub struct QueryState<T> {
    /// Last known value, also present during refreshes and after errors.
    pub value: Option<Arc<T>>,
    /// Lifecycle status of the entry.
    pub status: EntryStatus,
    /// The last fetch error, present while `status` is `Error`.
    pub error: Option<Error>,
    /// Whether a background refresh is in progress.
    pub refreshing: bool,
}

impl<T> fmt::Debug for QueryState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("has_value", &self.value.is_some())
            .field("status", &self.status)
            .field("error", &self.error)
            .field("refreshing", &self.refreshing)
            .finish()
    }
}

fn state_of<T: Send + Sync + 'static>(entry: &CacheEntry) -> QueryState<T> {
    QueryState {
        value: entry.value_as::<T>(),
        status: entry.status(),
        error: entry.error().cloned(),
        refreshing: entry.status() == EntryStatus::Refreshing,
    }
}

/// A live subscription to one query key.
///
/// Holding the handle keeps the key's background refresh alive; dropping it
/// detaches the subscriber, and with it the last one, stops the polling.
pub struct QueryHandle<T> {
    rx: watch::Receiver<CacheEntry>,
    guard: SubscriberGuard,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for QueryHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("key", self.guard.reg.spec.key())
            .finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> QueryHandle<T> {
    /// The key this handle observes.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        self.guard.reg.spec.key()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> QueryState<T> {
        state_of(&self.rx.borrow())
    }

    /// Waits for the next write to this key and returns the state after it.
    pub async fn changed(&mut self) -> QueryState<T> {
        let _ = self.rx.changed().await;
        let entry = self.rx.borrow_and_update().clone();
        state_of(&entry)
    }

    /// Waits until the query settles and returns its value or error.
    ///
    /// Settled means a successful fetch (`Ready`), a value already fresh at
    /// attach time, or a failed fetch (`Error`). Ongoing loads and refreshes
    /// are waited out.
    ///
    /// # Errors
    ///
    /// Returns the fetch error once the entry settles in the `Error` status,
    /// or a transport error if the cache store was torn down or the cached
    /// value is of a different type than this handle's.
    pub async fn settled(&mut self) -> Result<Arc<T>, Error> {
        loop {
            let entry = self.rx.borrow_and_update().clone();
            match entry.status() {
                EntryStatus::Ready => {
                    return entry.value_as::<T>().ok_or_else(|| Error::transport("cached value has an unexpected type"));
                }
                EntryStatus::Error => {
                    return Err(entry.error().cloned().unwrap_or_else(|| Error::transport("fetch failed")));
                }
                EntryStatus::Idle if entry.value().is_some() && !entry.is_fetching() => {
                    return entry.value_as::<T>().ok_or_else(|| Error::transport("cached value has an unexpected type"));
                }
                _ => {}
            }
            if self.rx.changed().await.is_err() {
                return Err(Error::transport("cache store closed"));
            }
        }
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The process-wide keyed cache store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::Instant;

use cadastre_remote::Error;

use crate::{CacheEntry, CacheKey, EntryStatus, KeyFamily, SharedValue};

/// The shared keyed store of cache entries.
///
/// One store instance holds every cached value of the process; the query and
/// mutation runners receive it as an explicit dependency rather than reaching
/// for an ambient singleton. Each key owns a watch channel: a write is fully
/// applied to the entry before subscribers are notified, giving every writer
/// the same atomicity unit (a single key's entry), and writes never block on
/// notification delivery.
///
/// Subscriptions are scoped: [`watch`](CacheStore::watch) returns a receiver
/// and dropping it is the guaranteed release, covering both orderly teardown
/// and early exits.
///
/// # Examples
///
/// ```
/// use cadastre_sync::{CacheKey, CacheStore, EntryStatus};
///
/// let store = CacheStore::new();
/// let key = CacheKey::root("landRecords");
///
/// assert_eq!(store.entry(&key).status(), EntryStatus::Idle);
///
/// store.set_typed(&key, vec!["P-1".to_string()], EntryStatus::Ready);
/// let cached = store.entry(&key).value_as::<Vec<String>>().expect("value cached");
/// assert_eq!(cached.len(), 1);
/// ```
pub struct CacheStore {
    slots: RwLock<HashMap<CacheKey, Arc<watch::Sender<CacheEntry>>>>,
    next_token: AtomicU64,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.slots.read().len())
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(0),
        }
    }

    fn sender(&self, key: &CacheKey) -> Arc<watch::Sender<CacheEntry>> {
        if let Some(tx) = self.slots.read().get(key) {
            return Arc::clone(tx);
        }
        let mut slots = self.slots.write();
        Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(watch::Sender::new(CacheEntry::empty()))),
        )
    }

    fn existing(&self, key: &CacheKey) -> Option<Arc<watch::Sender<CacheEntry>>> {
        self.slots.read().get(key).map(Arc::clone)
    }

    /// Returns the current entry for `key`, lazily creating an idle one.
    #[must_use]
    pub fn entry(&self, key: &CacheKey) -> CacheEntry {
        self.sender(key).borrow().clone()
    }

    /// Returns the current entry for `key` without creating one.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.existing(key).map(|tx| tx.borrow().clone())
    }

    /// Subscribes to every write of `key`.
    ///
    /// The receiver starts with the current entry marked as seen; each later
    /// write makes `changed()` resolve with the written entry observable.
    /// Dropping the receiver releases the subscription.
    #[must_use]
    pub fn watch(&self, key: &CacheKey) -> watch::Receiver<CacheEntry> {
        self.sender(key).subscribe()
    }

    /// Replaces the value and status of `key` and notifies its subscribers.
    ///
    /// A `Ready` status counts as a successful fetch: it stamps `fetched_at`
    /// and clears any invalidation mark and error.
    pub fn set(&self, key: &CacheKey, value: SharedValue, status: EntryStatus) {
        self.sender(key).send_modify(|entry| {
            entry.value = Some(value);
            entry.status = status;
            if status == EntryStatus::Ready {
                entry.error = None;
                entry.fetched_at = Some(Instant::now());
                entry.invalidated = false;
            }
        });
        tracing::debug!(%key, ?status, "value set");
    }

    /// Typed convenience over [`set`](Self::set).
    pub fn set_typed<T: Send + Sync + 'static>(&self, key: &CacheKey, value: T, status: EntryStatus) {
        self.set(key, Arc::new(value), status);
    }

    /// Updates the status of `key` without touching its value.
    pub fn set_status(&self, key: &CacheKey, status: EntryStatus) {
        self.sender(key).send_modify(|entry| entry.status = status);
    }

    /// Marks `key` as failed, keeping any previously cached value.
    pub fn set_error(&self, key: &CacheKey, error: Error) {
        self.sender(key).send_modify(|entry| {
            entry.status = EntryStatus::Error;
            entry.error = Some(error);
        });
    }

    /// Applies an optimistic update to the current value of `key`.
    ///
    /// `update` receives the current value and returns its replacement, or
    /// `None` to leave the entry untouched (nothing is written or notified in
    /// that case). A written replacement carries status `Loading` until the
    /// mutation reconciles. Returns whether a write happened.
    pub fn update_value(&self, key: &CacheKey, update: impl FnOnce(Option<&SharedValue>) -> Option<SharedValue>) -> bool {
        let written = self.sender(key).send_if_modified(|entry| match update(entry.value.as_ref()) {
            Some(next) => {
                entry.value = Some(next);
                entry.status = EntryStatus::Loading;
                true
            }
            None => false,
        });
        if written {
            tracing::debug!(%key, "optimistic value applied");
        }
        written
    }

    /// Restores `key` to a previously captured snapshot, exactly.
    ///
    /// Value, status, error, fetch timestamp, and invalidation mark all come
    /// back from the snapshot; an in-flight fetch token is left alone.
    pub fn restore(&self, key: &CacheKey, snapshot: CacheEntry) {
        self.sender(key).send_modify(|entry| {
            entry.value = snapshot.value;
            entry.status = snapshot.status;
            entry.error = snapshot.error;
            entry.fetched_at = snapshot.fetched_at;
            entry.invalidated = snapshot.invalidated;
        });
        tracing::debug!(%key, "entry restored from snapshot");
    }

    /// Marks every entry matching `family` as stale, keeping its value.
    ///
    /// Subscribers of the matching keys are notified so active queries can
    /// refetch; the old value keeps being served in the interim.
    pub fn invalidate(&self, family: &KeyFamily) {
        let matching: Vec<(CacheKey, Arc<watch::Sender<CacheEntry>>)> = self
            .slots
            .read()
            .iter()
            .filter(|(key, _)| family.matches(key))
            .map(|(key, tx)| (key.clone(), Arc::clone(tx)))
            .collect();

        for (key, tx) in matching {
            tx.send_modify(|entry| entry.invalidated = true);
            tracing::debug!(%key, %family, "entry invalidated");
        }
    }

    /// Captures the current entry of every key matching `family`.
    #[must_use]
    pub fn snapshot_family(&self, family: &KeyFamily) -> Vec<(CacheKey, CacheEntry)> {
        self.slots
            .read()
            .iter()
            .filter(|(key, _)| family.matches(key))
            .map(|(key, tx)| (key.clone(), tx.borrow().clone()))
            .collect()
    }

    /// Claims the single in-flight fetch slot of `key`.
    ///
    /// Returns a token when no fetch was in flight; the entry's status moves
    /// to `Loading` (no value yet) or `Refreshing` (previous value still
    /// served). Returns `None` when a fetch is already outstanding, in which
    /// case the caller joins it by observing the key's watch channel.
    pub fn begin_fetch(&self, key: &CacheKey) -> Option<u64> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        let claimed = self.sender(key).send_if_modified(|entry| {
            if entry.in_flight.is_some() {
                return false;
            }
            entry.in_flight = Some(token);
            entry.status = if entry.value.is_some() {
                EntryStatus::Refreshing
            } else {
                EntryStatus::Loading
            };
            true
        });
        if claimed {
            tracing::debug!(%key, token, "fetch started");
            Some(token)
        } else {
            None
        }
    }

    /// Commits a finished fetch for `key`.
    ///
    /// The result is committed even when the token no longer matches or all
    /// subscribers have detached; notification then simply reaches no one.
    pub fn complete_fetch(&self, key: &CacheKey, token: u64, value: SharedValue) {
        self.sender(key).send_modify(|entry| {
            if entry.in_flight == Some(token) {
                entry.in_flight = None;
            }
            entry.value = Some(value);
            entry.status = EntryStatus::Ready;
            entry.error = None;
            entry.fetched_at = Some(Instant::now());
            entry.invalidated = false;
        });
        tracing::debug!(%key, token, "fetch completed");
    }

    /// Records a failed fetch for `key`, keeping the previous value.
    ///
    /// The attempt discharges any invalidation mark; the next trigger
    /// (attach, interval tick, focus) retries.
    pub fn fail_fetch(&self, key: &CacheKey, token: u64, error: Error) {
        tracing::warn!(%key, token, %error, "fetch failed");
        self.sender(key).send_modify(|entry| {
            if entry.in_flight == Some(token) {
                entry.in_flight = None;
            }
            entry.status = EntryStatus::Error;
            entry.error = Some(error);
            entry.invalidated = false;
        });
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The mutation runner: optimistic apply, remote commit, reconcile.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use cadastre_remote::Error;

use crate::{CacheEntry, CacheKey, CacheStore, KeyFamily, Readiness, SharedValue};

/// Declaration of one mutation operation: its name and the key families it
/// optimistically touches and later invalidates.
///
/// # Examples
///
/// ```
/// use cadastre_sync::{KeyFamily, MutationSpec};
///
/// let spec = MutationSpec::new("registerLandParcel")
///     .affects(KeyFamily::root("landRecords"))
///     .affects(KeyFamily::root("userProfile"));
///
/// assert_eq!(spec.affected().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MutationSpec {
    name: &'static str,
    affected: Vec<KeyFamily>,
}

impl MutationSpec {
    /// Declares a mutation with the given operation name.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self { name, affected: Vec::new() }
    }

    /// Adds a key family this mutation touches and invalidates.
    #[must_use]
    pub fn affects(mut self, family: KeyFamily) -> Self {
        self.affected.push(family);
        self
    }

    /// The operation name, used for logging and the pending gauge.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The declared key families.
    #[must_use]
    pub fn affected(&self) -> &[KeyFamily] {
        &self.affected
    }
}

/// A typed speculative write against one cache key.
///
/// The update closure receives the currently cached value and returns its
/// replacement, or `None` to leave the key untouched; an uncached key stays
/// uncached rather than being seeded with a guess.
pub struct OptimisticUpdate {
    key: CacheKey,
    apply: Box<dyn FnOnce(Option<&SharedValue>) -> Option<SharedValue> + Send>,
}

impl OptimisticUpdate {
    /// Creates an update of the `T`-typed value cached under `key`.
    pub fn new<T, F>(key: CacheKey, update: F) -> Self
    where
        T: Send + Sync + 'static,
        F: FnOnce(Option<&T>) -> Option<T> + Send + 'static,
    {
        Self {
            key,
            apply: Box::new(move |current| {
                let typed = current.and_then(|value| value.as_ref().downcast_ref::<T>());
                update(typed).map(|next| Arc::new(next) as SharedValue)
            }),
        }
    }

    /// The key this update targets.
    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }
}

impl fmt::Debug for OptimisticUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticUpdate").field("key", &self.key).finish_non_exhaustive()
    }
}

/// Executes writes against the remote service with three-phase semantics:
/// optimistic apply, remote commit, reconcile.
///
/// Each run is atomic in outcome: either the commit succeeds and the affected
/// families are invalidated for authoritative refetch, or every snapshotted
/// key is restored to its pre-mutation entry. Two concurrent runs touching
/// overlapping keys are not coordinated with each other; the last one to
/// reconcile wins.
pub struct MutationRunner {
    store: Arc<CacheStore>,
    readiness: Readiness,
    pending: Mutex<HashMap<&'static str, usize>>,
}

impl fmt::Debug for MutationRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationRunner")
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl MutationRunner {
    /// Creates a runner over the given store and readiness predicate.
    #[must_use]
    pub fn new(store: Arc<CacheStore>, readiness: Readiness) -> Self {
        Self {
            store,
            readiness,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a run of the named operation is currently in its commit phase.
    #[must_use]
    pub fn pending(&self, name: &str) -> bool {
        self.pending.lock().get(name).copied().unwrap_or(0) > 0
    }

    /// Runs one mutation to completion.
    ///
    /// **Prepare**: snapshots every currently cached key matching the spec's
    /// affected families (plus any key targeted by an optimistic update),
    /// then applies the optimistic updates so subscribers see the change
    /// before the remote call resolves.
    ///
    /// **Commit**: awaits `commit`, unless the session is not ready, in
    /// which case the commit fails with [`Error::NotReady`] without a remote
    /// call being issued.
    ///
    /// **Reconcile**: on success, invalidates every affected family so active
    /// queries refetch authoritative state, and returns the remote's value.
    /// On failure, restores every snapshotted key exactly and returns the
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the commit error after rollback; the error is also the signal
    /// for a user-facing failure notification. Nothing is swallowed.
    pub async fn run<T, Fut>(&self, spec: MutationSpec, optimistic: Vec<OptimisticUpdate>, commit: Fut) -> Result<T, Error>
    where
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut snapshot: HashMap<CacheKey, CacheEntry> = HashMap::new();
        for family in spec.affected() {
            for (key, entry) in self.store.snapshot_family(family) {
                snapshot.entry(key).or_insert(entry);
            }
        }
        for update in optimistic {
            let OptimisticUpdate { key, apply } = update;
            snapshot.entry(key.clone()).or_insert_with(|| self.store.entry(&key));
            self.store.update_value(&key, apply);
        }
        tracing::debug!(operation = spec.name(), snapshotted = snapshot.len(), "mutation prepared");

        let outcome = {
            let _pending = PendingGuard::enter(&self.pending, spec.name());
            if self.readiness.is_ready() {
                commit.await
            } else {
                Err(Error::NotReady)
            }
        };

        match outcome {
            Ok(value) => {
                for family in spec.affected() {
                    self.store.invalidate(family);
                }
                tracing::debug!(operation = spec.name(), "mutation committed");
                Ok(value)
            }
            Err(error) => {
                tracing::warn!(operation = spec.name(), %error, "mutation failed, rolling back");
                for (key, entry) in snapshot {
                    self.store.restore(&key, entry);
                }
                Err(error)
            }
        }
    }
}

/// Scoped increment of the per-operation pending gauge.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<&'static str, usize>>,
    name: &'static str,
}

impl<'a> PendingGuard<'a> {
    fn enter(pending: &'a Mutex<HashMap<&'static str, usize>>, name: &'static str) -> Self {
        *pending.lock().entry(name).or_insert(0) += 1;
        Self { pending, name }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if let Some(count) = pending.get_mut(self.name) {
            *count -= 1;
            if *count == 0 {
                pending.remove(self.name);
            }
        }
    }
}

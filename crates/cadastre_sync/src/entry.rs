// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache entries and their status machine.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cadastre_remote::Error;
use tokio::time::Instant;

/// A cached value as held by the store.
///
/// The store is heterogeneous (one process-wide store holds many entity
/// types), so values are type-erased here and recovered at the typed handle
/// layer.
pub type SharedValue = Arc<dyn Any + Send + Sync>;

/// Lifecycle state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// No fetch has been asked of this entry yet.
    Idle,
    /// A fetch is in progress and no previous value exists to show.
    Loading,
    /// A fetch is in progress while the previous value is still served.
    Refreshing,
    /// The last fetch succeeded.
    Ready,
    /// The last fetch failed; any previous value is retained.
    Error,
}

/// One cache entry: the last known value plus status and timing metadata.
///
/// Entries are owned exclusively by the [`CacheStore`](crate::CacheStore);
/// what circulates outside the store are snapshots delivered through watch
/// channels, so a snapshot never changes under its holder.
#[derive(Clone)]
pub struct CacheEntry {
    pub(crate) value: Option<SharedValue>,
    pub(crate) status: EntryStatus,
    pub(crate) error: Option<Error>,
    pub(crate) fetched_at: Option<Instant>,
    pub(crate) invalidated: bool,
    pub(crate) in_flight: Option<u64>,
}

impl CacheEntry {
    pub(crate) fn empty() -> Self {
        Self {
            value: None,
            status: EntryStatus::Idle,
            error: None,
            fetched_at: None,
            invalidated: false,
            in_flight: None,
        }
    }

    /// The last known value, if any fetch or optimistic write has produced one.
    #[must_use]
    pub fn value(&self) -> Option<&SharedValue> {
        self.value.as_ref()
    }

    /// The last known value downcast to its concrete type.
    ///
    /// Returns `None` when no value exists or when the entry holds a
    /// different type than requested (a key names exactly one value type).
    #[must_use]
    pub fn value_as<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.value.as_ref().and_then(|value| Arc::clone(value).downcast::<T>().ok())
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> EntryStatus {
        self.status
    }

    /// The error of the last failed fetch, present while `status` is `Error`.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// When the value was last set from a successful fetch.
    #[must_use]
    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// Whether the entry carries an explicit invalidation mark.
    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Whether a fetch for this entry is currently in flight.
    #[must_use]
    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Whether the entry warrants a refetch: explicitly invalidated, never
    /// successfully fetched, or older than `stale_after`.
    #[must_use]
    pub fn is_stale(&self, stale_after: Duration) -> bool {
        self.invalidated || self.fetched_at.is_none_or(|at| at.elapsed() > stale_after)
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("has_value", &self.value.is_some())
            .field("status", &self.status)
            .field("error", &self.error)
            .field("invalidated", &self.invalidated)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_entry_is_idle_and_stale() {
        let entry = CacheEntry::empty();

        assert_eq!(entry.status(), EntryStatus::Idle);
        assert!(entry.value().is_none());
        assert!(entry.is_stale(Duration::from_secs(3600)));
        assert!(!entry.is_fetching());
    }

    #[test]
    fn value_as_rejects_other_types() {
        let mut entry = CacheEntry::empty();
        entry.value = Some(Arc::new(7_u32));

        assert_eq!(entry.value_as::<u32>().as_deref(), Some(&7));
        assert!(entry.value_as::<String>().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn staleness_follows_the_clock() {
        let mut entry = CacheEntry::empty();
        entry.fetched_at = Some(Instant::now());

        assert!(!entry.is_stale(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(entry.is_stale(Duration::from_secs(10)));
    }

    #[test]
    fn invalidation_overrides_freshness() {
        let mut entry = CacheEntry::empty();
        entry.fetched_at = Some(Instant::now());
        entry.invalidated = true;

        assert!(entry.is_stale(Duration::from_secs(3600)));
    }
}

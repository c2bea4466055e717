// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Reactive query and optimistic-mutation caching for the cadastre client.
//!
//! This crate is the synchronization engine between UI consumers and the
//! remote land registry:
//!
//! - A process-wide [`CacheStore`] of keyed entries with per-key watch
//!   subscriptions and stale-while-revalidate invalidation.
//! - A [`QueryRunner`] that drives initial loads, staleness-gated refetches,
//!   background polling, and de-duplication of concurrent fetches per key.
//! - A [`MutationRunner`] that applies writes speculatively, commits them
//!   remotely, and reconciles by invalidation fan-out or exact rollback.
//!
//! The store is an explicit dependency handed to both runners; there is no
//! ambient global state. Session readiness is likewise an explicit
//! [`Readiness`] predicate checked before any remote call.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use cadastre_sync::{CacheKey, CacheStore, QueryRunner, QuerySpec, Readiness};
//!
//! # async fn example() -> Result<(), cadastre_sync::Error> {
//! let store = Arc::new(CacheStore::new());
//! let queries = QueryRunner::new(Arc::clone(&store), Readiness::always());
//!
//! let mut handle = queries.subscribe(
//!     QuerySpec::new(CacheKey::root("landRecords"), Duration::from_secs(25), Some(Duration::from_secs(30))),
//!     || async { Ok(Vec::<String>::new()) },
//! );
//!
//! let records = handle.settled().await?;
//! assert!(records.is_empty());
//! # Ok(())
//! # }
//! ```

mod entry;
mod key;
mod mutation;
mod query;
mod store;

pub use cadastre_remote::Error;
pub use entry::{CacheEntry, EntryStatus, SharedValue};
pub use key::{CacheKey, KeyFamily};
pub use mutation::{MutationRunner, MutationSpec, OptimisticUpdate};
pub use query::{QueryHandle, QueryRunner, QuerySpec, QueryState, Readiness};
pub use store::CacheStore;

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Typed land-registry client surface over the cadastre cache engine.
//!
//! [`Cadastre`] wires the [`QueryRunner`] and [`MutationRunner`] to a
//! [`RemoteClient`] and registers the standard query and mutation surface of
//! the land-registry application: record collections, per-parcel details,
//! free-text search, the actor profile, and unsettled transfers, each with
//! its own staleness window and polling interval. Registrations and their
//! optimistic mutation shapes follow the application's volatility profile:
//! pending transfers poll every few seconds, aggregates every half minute.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cadastre::{Cadastre, RegisterParcel, RemoteClient};
//!
//! # async fn example<C: RemoteClient + Send + Sync + 'static>(client: Arc<C>) -> Result<(), cadastre::Error> {
//! let cadastre = Cadastre::new(client);
//!
//! let mut records = cadastre.land_records();
//! println!("{} parcels", records.settled().await?.len());
//!
//! cadastre
//!     .register_parcel(RegisterParcel {
//!         parcel_id: "P-100".into(),
//!         geo_coordinates: "47.60,-122.33".into(),
//!         deed_hash: "ab12".into(),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

pub use cadastre_remote::{
    Error, LandRecord, PendingTransfer, RecordStatus, RegisterParcel, RemoteClient, TransferOwnership, TransferStatus,
    UserProfile,
};
pub use cadastre_sync::{
    CacheKey, CacheStore, EntryStatus, KeyFamily, MutationRunner, MutationSpec, OptimisticUpdate, QueryHandle,
    QueryRunner, QuerySpec, QueryState, Readiness,
};

pub mod keys;

/// Staleness window of the record and profile aggregates.
const AGGREGATE_STALE_AFTER: Duration = Duration::from_secs(25);
/// Polling interval of the record and profile aggregates.
const AGGREGATE_REFRESH_INTERVAL: Duration = Duration::from_secs(30);
/// Staleness window of per-parcel details and search results.
const DETAIL_STALE_AFTER: Duration = Duration::from_secs(8);
/// Polling interval of per-parcel details and search results.
const DETAIL_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
/// Staleness window of the unsettled-transfer list, the most volatile entity.
const TRANSFERS_STALE_AFTER: Duration = Duration::from_secs(3);
/// Polling interval of the unsettled-transfer list.
const TRANSFERS_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// The land-registry client: one cache store, both runners, and the typed
/// query/mutation surface of the application.
///
/// Queries return live [`QueryHandle`]s; holding a handle keeps the key's
/// background polling alive and dropping it detaches. Mutations apply
/// optimistically, commit through the [`RemoteClient`], and reconcile by
/// invalidating their affected key families (success) or rolling the cache
/// back (failure).
pub struct Cadastre<C> {
    client: Arc<C>,
    queries: QueryRunner,
    mutations: MutationRunner,
}

impl<C> fmt::Debug for Cadastre<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cadastre").finish_non_exhaustive()
    }
}

impl<C> Cadastre<C>
where
    C: RemoteClient + Send + Sync + 'static,
{
    /// Creates a client over the given remote binding with an empty cache.
    #[must_use]
    pub fn new(client: Arc<C>) -> Self {
        let store = Arc::new(CacheStore::new());
        let readiness = {
            let client = Arc::clone(&client);
            Readiness::new(move || client.is_ready())
        };
        Self {
            queries: QueryRunner::new(Arc::clone(&store), readiness.clone()),
            mutations: MutationRunner::new(store, readiness),
            client,
        }
    }

    /// The cache store backing this client.
    #[must_use]
    pub fn store(&self) -> &Arc<CacheStore> {
        self.queries.store()
    }

    /// Whether a run of the named mutation is currently committing.
    #[must_use]
    pub fn mutation_pending(&self, name: &str) -> bool {
        self.mutations.pending(name)
    }

    /// Propagates a UI focus regain: every focus-sensitive query with active
    /// subscribers refetches if stale.
    pub fn focus_regained(&self) {
        self.queries.focus_regained();
    }

    /// Subscribes to the collection of all registered land records.
    #[must_use]
    pub fn land_records(&self) -> QueryHandle<Vec<LandRecord>> {
        let client = Arc::clone(&self.client);
        self.queries.subscribe(
            QuerySpec::new(keys::land_records(), AGGREGATE_STALE_AFTER, Some(AGGREGATE_REFRESH_INTERVAL))
                .refetch_on_focus(true),
            move || {
                let client = Arc::clone(&client);
                async move { client.fetch_all_records().await }
            },
        )
    }

    /// Subscribes to one parcel's record.
    #[must_use]
    pub fn land_record(&self, parcel_id: &str) -> QueryHandle<Option<LandRecord>> {
        let client = Arc::clone(&self.client);
        let parcel = parcel_id.to_owned();
        self.queries.subscribe(
            QuerySpec::new(keys::land_record(parcel_id), DETAIL_STALE_AFTER, Some(DETAIL_REFRESH_INTERVAL))
                .refetch_on_focus(true),
            move || {
                let client = Arc::clone(&client);
                let parcel = parcel.clone();
                async move { client.fetch_record(&parcel).await }
            },
        )
    }

    /// Subscribes to the records matching a free-text query.
    #[must_use]
    pub fn search_records(&self, query: &str) -> QueryHandle<Vec<LandRecord>> {
        let client = Arc::clone(&self.client);
        let query_text = query.to_owned();
        self.queries.subscribe(
            QuerySpec::new(keys::search(query), DETAIL_STALE_AFTER, Some(DETAIL_REFRESH_INTERVAL)).refetch_on_focus(true),
            move || {
                let client = Arc::clone(&client);
                let query_text = query_text.clone();
                async move { client.search_records(&query_text).await }
            },
        )
    }

    /// Subscribes to the current actor's profile.
    #[must_use]
    pub fn user_profile(&self) -> QueryHandle<Option<UserProfile>> {
        let client = Arc::clone(&self.client);
        self.queries.subscribe(
            QuerySpec::new(keys::user_profile(), AGGREGATE_STALE_AFTER, Some(AGGREGATE_REFRESH_INTERVAL))
                .refetch_on_focus(true),
            move || {
                let client = Arc::clone(&client);
                async move { client.fetch_profile().await }
            },
        )
    }

    /// Subscribes to the transfers that are initiated but not yet settled.
    #[must_use]
    pub fn pending_transfers(&self) -> QueryHandle<Vec<PendingTransfer>> {
        let client = Arc::clone(&self.client);
        self.queries.subscribe(
            QuerySpec::new(keys::pending_transfers(), TRANSFERS_STALE_AFTER, Some(TRANSFERS_REFRESH_INTERVAL))
                .refetch_on_focus(true),
            move || {
                let client = Arc::clone(&client);
                async move { client.fetch_pending_transfers().await }
            },
        )
    }

    /// Registers a new land parcel.
    ///
    /// The record list immediately shows the new parcel as `ACTIVE` while the
    /// registry call is outstanding. On success the record, search, and
    /// profile families are invalidated so every active view refetches the
    /// authoritative state; on failure the speculative record disappears and
    /// the error is returned for a user-facing notification.
    ///
    /// # Errors
    ///
    /// Returns the registry's rejection, a transport failure, or
    /// [`Error::NotReady`] while the session is still initializing. The cache
    /// is rolled back in every error case.
    pub async fn register_parcel(&self, req: RegisterParcel) -> Result<LandRecord, Error> {
        let spec = MutationSpec::new("registerLandParcel")
            .affects(keys::land_records_family())
            .affects(keys::search_family())
            .affects(keys::user_profile_family());

        let speculative = LandRecord {
            parcel_id: req.parcel_id.clone(),
            geo_coordinates: req.geo_coordinates.clone(),
            deed_hash: req.deed_hash.clone(),
            current_owner: None,
            status: RecordStatus::Active,
            registration_date: Utc::now(),
        };
        let updates = vec![OptimisticUpdate::new::<Vec<LandRecord>, _>(keys::land_records(), move |records| {
            records.map(|records| {
                let mut records = records.clone();
                records.push(speculative);
                records
            })
        })];

        let client = Arc::clone(&self.client);
        self.mutations.run(spec, updates, async move { client.register_parcel(req).await }).await
    }

    /// Initiates an ownership transfer for a parcel.
    ///
    /// The parcel's detail entry immediately shows the new owner and
    /// `PENDING_TRANSFER` status, and the unsettled-transfer list grows by a
    /// `Pending` row, while the registry call is outstanding. Reconciliation
    /// mirrors [`register_parcel`](Self::register_parcel): invalidation
    /// fan-out on success, exact rollback on failure.
    ///
    /// # Errors
    ///
    /// Returns the registry's rejection, a transport failure, or
    /// [`Error::NotReady`] while the session is still initializing. The cache
    /// is rolled back in every error case.
    pub async fn transfer_ownership(&self, req: TransferOwnership) -> Result<PendingTransfer, Error> {
        let spec = MutationSpec::new("transferOwnership")
            .affects(keys::land_record_family(&req.parcel_id))
            .affects(keys::land_records_family())
            .affects(keys::pending_transfers_family())
            .affects(keys::user_profile_family());

        let record_update = OptimisticUpdate::new::<Option<LandRecord>, _>(keys::land_record(&req.parcel_id), {
            let new_owner = req.new_owner.clone();
            move |current| match current {
                Some(Some(record)) => {
                    let mut record = record.clone();
                    record.current_owner = Some(new_owner);
                    record.status = RecordStatus::PendingTransfer;
                    Some(Some(record))
                }
                _ => None,
            }
        });
        let transfers_update = OptimisticUpdate::new::<Vec<PendingTransfer>, _>(keys::pending_transfers(), {
            let parcel_id = req.parcel_id.clone();
            let new_owner = req.new_owner.clone();
            move |current| {
                current.map(|transfers| {
                    let mut transfers = transfers.clone();
                    transfers.push(PendingTransfer {
                        parcel_id,
                        new_owner,
                        status: TransferStatus::Pending,
                        initiated_date: Utc::now(),
                    });
                    transfers
                })
            }
        });

        let client = Arc::clone(&self.client);
        self.mutations
            .run(spec, vec![record_update, transfers_update], async move {
                client.transfer_ownership(req).await
            })
            .await
    }
}

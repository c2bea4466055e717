// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The abstract boundary to the remote land-registry service.

use crate::{Error, LandRecord, PendingTransfer, RegisterParcel, TransferOwnership, UserProfile};

/// Asynchronous operations exposed by the remote land registry.
///
/// The cache engine treats this interface as opaque: it issues one call per
/// entity action and never retries on its own. Retry policy, if any, belongs
/// to the implementation behind this trait.
///
/// [`is_ready`](RemoteClient::is_ready) is the readiness predicate checked
/// before any call is issued. While it returns `false` (e.g. the session is
/// still acquiring an identity), callers surface [`Error::NotReady`] instead
/// of invoking the remote.
///
/// The trait is produced through `trait_variant` so that the futures of every
/// method are `Send` and can be driven from spawned background tasks.
#[trait_variant::make(RemoteClient: Send)]
pub trait LocalRemoteClient: Sync {
    /// Returns whether the remote binding is established and calls may be issued.
    fn is_ready(&self) -> bool;

    /// Fetches every registered land record.
    async fn fetch_all_records(&self) -> Result<Vec<LandRecord>, Error>;

    /// Fetches one land record by parcel identifier, if registered.
    async fn fetch_record(&self, parcel_id: &str) -> Result<Option<LandRecord>, Error>;

    /// Searches land records by free-text query.
    async fn search_records(&self, query: &str) -> Result<Vec<LandRecord>, Error>;

    /// Registers a new land parcel and returns the authoritative record.
    async fn register_parcel(&self, req: RegisterParcel) -> Result<LandRecord, Error>;

    /// Initiates an ownership transfer and returns the authoritative entry.
    async fn transfer_ownership(&self, req: TransferOwnership) -> Result<PendingTransfer, Error>;

    /// Fetches the current actor's profile, if the actor has one.
    async fn fetch_profile(&self) -> Result<Option<UserProfile>, Error>;

    /// Fetches transfers that are initiated but not yet settled.
    async fn fetch_pending_transfers(&self) -> Result<Vec<PendingTransfer>, Error>;
}

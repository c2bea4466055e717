// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! `MockRemote` for testing: record operations, inject failures, pre-seed registry data.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use crate::{
    Error, LandRecord, PendingTransfer, RecordStatus, RegisterParcel, RemoteClient, TransferOwnership, TransferStatus,
    UserProfile,
};

/// One recorded call against a [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    /// `fetch_all_records` was called.
    FetchAllRecords,
    /// `fetch_record` was called with the given parcel id.
    FetchRecord(String),
    /// `search_records` was called with the given query.
    SearchRecords(String),
    /// `register_parcel` was called with the given payload.
    RegisterParcel(RegisterParcel),
    /// `transfer_ownership` was called with the given payload.
    TransferOwnership(TransferOwnership),
    /// `fetch_profile` was called.
    FetchProfile,
    /// `fetch_pending_transfers` was called.
    FetchPendingTransfers,
}

type FailMatcher = Box<dyn Fn(&RemoteOp) -> Option<Error> + Send + Sync>;

#[derive(Default)]
struct MockState {
    records: Mutex<Vec<LandRecord>>,
    transfers: Mutex<Vec<PendingTransfer>>,
    profile: Mutex<Option<UserProfile>>,
    ops: Mutex<Vec<RemoteOp>>,
    fail: Mutex<Option<FailMatcher>>,
    latency: Mutex<Duration>,
    not_ready: AtomicBool,
}

/// An in-memory [`RemoteClient`] for tests.
///
/// The mock behaves like a tiny registry: registered parcels land in its
/// record list and transfers mark their parcel `PENDING_TRANSFER`, so cache
/// refetches after a mutation observe authoritative state. On top of that it
/// records every operation, injects failures through a caller-supplied
/// matcher, simulates readiness, and can delay responses so a test with a
/// paused clock can hold a call in flight deterministically.
///
/// Cloning shares all state, which lets a test keep a handle while the
/// system under test owns another.
///
/// # Examples
///
/// ```
/// use cadastre_remote::testing::{MockRemote, RemoteOp};
/// use cadastre_remote::{Error, RemoteClient};
/// # futures::executor::block_on(async {
///
/// let mock = MockRemote::new();
/// assert!(mock.fetch_all_records().await.expect("fetch works").is_empty());
///
/// mock.fail_when(|op| matches!(op, RemoteOp::FetchAllRecords).then(|| Error::transport("down")));
/// assert!(mock.fetch_all_records().await.is_err());
///
/// mock.clear_failures();
/// assert_eq!(mock.operations().len(), 2);
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MockRemote {
    state: Arc<MockState>,
}

impl std::fmt::Debug for MockRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRemote")
            .field("ops", &self.state.ops.lock().len())
            .finish_non_exhaustive()
    }
}

impl MockRemote {
    /// Creates an empty, ready mock registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record into the mock registry.
    pub fn seed_record(&self, record: LandRecord) {
        self.state.records.lock().push(record);
    }

    /// Seeds a pending transfer into the mock registry.
    pub fn seed_transfer(&self, transfer: PendingTransfer) {
        self.state.transfers.lock().push(transfer);
    }

    /// Sets the profile returned by `fetch_profile`.
    pub fn set_profile(&self, profile: Option<UserProfile>) {
        *self.state.profile.lock() = profile;
    }

    /// Toggles the readiness predicate.
    pub fn set_ready(&self, ready: bool) {
        self.state.not_ready.store(!ready, Ordering::SeqCst);
    }

    /// Delays every response by the given duration.
    ///
    /// Driven by `tokio::time::sleep`, so a paused test clock controls it.
    pub fn set_latency(&self, latency: Duration) {
        *self.state.latency.lock() = latency;
    }

    /// Returns every operation recorded so far, in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<RemoteOp> {
        self.state.ops.lock().clone()
    }

    /// Returns how many recorded operations match the predicate.
    #[must_use]
    pub fn count(&self, matches: impl Fn(&RemoteOp) -> bool) -> usize {
        self.state.ops.lock().iter().filter(|op| matches(op)).count()
    }

    /// Fails every operation for which the matcher returns an error.
    pub fn fail_when(&self, matcher: impl Fn(&RemoteOp) -> Option<Error> + Send + Sync + 'static) {
        *self.state.fail.lock() = Some(Box::new(matcher));
    }

    /// Clears any installed failure matcher.
    pub fn clear_failures(&self) {
        *self.state.fail.lock() = None;
    }

    /// Returns the current record list.
    #[must_use]
    pub fn records(&self) -> Vec<LandRecord> {
        self.state.records.lock().clone()
    }

    /// Records the call, applies latency, then evaluates failure injection.
    async fn observe(&self, op: RemoteOp) -> Result<(), Error> {
        self.state.ops.lock().push(op.clone());
        let latency = *self.state.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let injected = self.state.fail.lock().as_ref().and_then(|matcher| matcher(&op));
        match injected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl RemoteClient for MockRemote {
    fn is_ready(&self) -> bool {
        !self.state.not_ready.load(Ordering::SeqCst)
    }

    async fn fetch_all_records(&self) -> Result<Vec<LandRecord>, Error> {
        self.observe(RemoteOp::FetchAllRecords).await?;
        Ok(self.state.records.lock().clone())
    }

    async fn fetch_record(&self, parcel_id: &str) -> Result<Option<LandRecord>, Error> {
        self.observe(RemoteOp::FetchRecord(parcel_id.to_owned())).await?;
        Ok(self.state.records.lock().iter().find(|r| r.parcel_id == parcel_id).cloned())
    }

    async fn search_records(&self, query: &str) -> Result<Vec<LandRecord>, Error> {
        self.observe(RemoteOp::SearchRecords(query.to_owned())).await?;
        let query = query.to_lowercase();
        Ok(self
            .state
            .records
            .lock()
            .iter()
            .filter(|r| r.parcel_id.to_lowercase().contains(&query))
            .cloned()
            .collect())
    }

    async fn register_parcel(&self, req: RegisterParcel) -> Result<LandRecord, Error> {
        self.observe(RemoteOp::RegisterParcel(req.clone())).await?;
        if self.state.records.lock().iter().any(|r| r.parcel_id == req.parcel_id) {
            return Err(Error::rejected(format!("parcel {} already registered", req.parcel_id)));
        }
        let owner = self.state.profile.lock().as_ref().map(|p| p.principal.clone());
        let record = LandRecord {
            parcel_id: req.parcel_id,
            geo_coordinates: req.geo_coordinates,
            deed_hash: req.deed_hash,
            current_owner: owner,
            status: RecordStatus::Active,
            registration_date: Utc::now(),
        };
        self.state.records.lock().push(record.clone());
        Ok(record)
    }

    async fn transfer_ownership(&self, req: TransferOwnership) -> Result<PendingTransfer, Error> {
        self.observe(RemoteOp::TransferOwnership(req.clone())).await?;
        let mut records = self.state.records.lock();
        let Some(record) = records.iter_mut().find(|r| r.parcel_id == req.parcel_id) else {
            return Err(Error::rejected(format!("unknown parcel {}", req.parcel_id)));
        };
        record.status = RecordStatus::PendingTransfer;
        drop(records);

        let transfer = PendingTransfer {
            parcel_id: req.parcel_id,
            new_owner: req.new_owner,
            status: TransferStatus::Pending,
            initiated_date: Utc::now(),
        };
        self.state.transfers.lock().push(transfer.clone());
        Ok(transfer)
    }

    async fn fetch_profile(&self) -> Result<Option<UserProfile>, Error> {
        self.observe(RemoteOp::FetchProfile).await?;
        Ok(self.state.profile.lock().clone())
    }

    async fn fetch_pending_transfers(&self) -> Result<Vec<PendingTransfer>, Error> {
        self.observe(RemoteOp::FetchPendingTransfers).await?;
        Ok(self.state.transfers.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_fetch_round_trip() {
        let mock = MockRemote::new();
        let record = mock
            .register_parcel(RegisterParcel {
                parcel_id: "P-1".into(),
                geo_coordinates: "0,0".into(),
                deed_hash: "h".into(),
            })
            .await
            .expect("register succeeds");
        assert_eq!(record.status, RecordStatus::Active);

        let fetched = mock.fetch_record("P-1").await.expect("fetch succeeds");
        assert_eq!(fetched, Some(record));
        assert_eq!(mock.count(|op| matches!(op, RemoteOp::RegisterParcel(_))), 1);
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let mock = MockRemote::new();
        let req = RegisterParcel {
            parcel_id: "P-1".into(),
            geo_coordinates: "0,0".into(),
            deed_hash: "h".into(),
        };
        mock.register_parcel(req.clone()).await.expect("first registration succeeds");

        let err = mock.register_parcel(req).await.expect_err("duplicate refused");
        assert!(err.is_rejected());
    }

    #[tokio::test]
    async fn transfer_marks_record_pending() {
        let mock = MockRemote::new();
        mock.register_parcel(RegisterParcel {
            parcel_id: "P-1".into(),
            geo_coordinates: "0,0".into(),
            deed_hash: "h".into(),
        })
        .await
        .expect("register succeeds");

        let transfer = mock
            .transfer_ownership(TransferOwnership {
                parcel_id: "P-1".into(),
                new_owner: "bob".into(),
            })
            .await
            .expect("transfer succeeds");
        assert_eq!(transfer.status, TransferStatus::Pending);

        let record = mock.fetch_record("P-1").await.expect("fetch succeeds").expect("record exists");
        assert_eq!(record.status, RecordStatus::PendingTransfer);
    }

    #[tokio::test]
    async fn failure_injection_and_clearing() {
        let mock = MockRemote::new();
        mock.fail_when(|op| matches!(op, RemoteOp::FetchAllRecords).then(|| Error::transport("down")));

        assert!(mock.fetch_all_records().await.is_err());

        mock.clear_failures();
        assert!(mock.fetch_all_records().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn latency_is_driven_by_the_test_clock() {
        let mock = MockRemote::new();
        mock.set_latency(Duration::from_millis(250));

        let started = tokio::time::Instant::now();
        mock.fetch_profile().await.expect("fetch succeeds");
        assert_eq!(started.elapsed(), Duration::from_millis(250));
    }
}

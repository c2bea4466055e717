// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The cache key space of the land-registry client.

use cadastre_sync::{CacheKey, KeyFamily};

/// Key of the all-records collection.
#[must_use]
pub fn land_records() -> CacheKey {
    CacheKey::root("landRecords")
}

/// Key of one record's detail entry.
#[must_use]
pub fn land_record(parcel_id: &str) -> CacheKey {
    CacheKey::new(["landRecord", parcel_id])
}

/// Key of one search result set.
#[must_use]
pub fn search(query: &str) -> CacheKey {
    CacheKey::new(["searchLandRecords", query])
}

/// Key of the current actor's profile.
#[must_use]
pub fn user_profile() -> CacheKey {
    CacheKey::root("userProfile")
}

/// Key of the unsettled-transfers collection.
#[must_use]
pub fn pending_transfers() -> CacheKey {
    CacheKey::root("pendingTransfers")
}

/// Family covering the all-records collection.
#[must_use]
pub fn land_records_family() -> KeyFamily {
    KeyFamily::root("landRecords")
}

/// Family covering one record's detail entry.
#[must_use]
pub fn land_record_family(parcel_id: &str) -> KeyFamily {
    land_record(parcel_id).into()
}

/// Family covering every cached search result set.
#[must_use]
pub fn search_family() -> KeyFamily {
    KeyFamily::root("searchLandRecords")
}

/// Family covering the current actor's profile.
#[must_use]
pub fn user_profile_family() -> KeyFamily {
    KeyFamily::root("userProfile")
}

/// Family covering the unsettled-transfers collection.
#[must_use]
pub fn pending_transfers_family() -> KeyFamily {
    KeyFamily::root("pendingTransfers")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_keys_share_one_family() {
        assert!(search_family().matches(&search("downtown")));
        assert!(search_family().matches(&search("harbor")));
        assert!(!search_family().matches(&land_records()));
    }

    #[test]
    fn record_families_are_per_parcel() {
        assert!(land_record_family("P-1").matches(&land_record("P-1")));
        assert!(!land_record_family("P-1").matches(&land_record("P-2")));
    }
}

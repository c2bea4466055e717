// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Land-registry entity types exchanged with the remote service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a registered land parcel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// The parcel is registered and not part of any transfer.
    Active,
    /// An ownership transfer for the parcel is awaiting settlement.
    PendingTransfer,
}

/// A registered land parcel as held by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandRecord {
    /// Registry-unique parcel identifier.
    pub parcel_id: String,
    /// Geographic coordinates of the parcel boundary.
    pub geo_coordinates: String,
    /// Content hash of the deed document.
    pub deed_hash: String,
    /// Current owner, when known. A speculatively registered parcel has no
    /// owner until the registry derives one from the caller's identity.
    pub current_owner: Option<String>,
    /// Lifecycle state of the record.
    pub status: RecordStatus,
    /// When the parcel was registered.
    pub registration_date: DateTime<Utc>,
}

/// Settlement state of an ownership transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    /// The transfer has been initiated and awaits settlement.
    Pending,
    /// The registry settled the transfer.
    Approved,
    /// The registry refused the transfer.
    Rejected,
}

/// An in-flight ownership transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransfer {
    /// The parcel being transferred.
    pub parcel_id: String,
    /// The receiving owner.
    pub new_owner: String,
    /// Settlement state.
    pub status: TransferStatus,
    /// When the transfer was initiated.
    pub initiated_date: DateTime<Utc>,
}

/// Profile of the actor whose session backs the remote binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Stable principal identifier of the actor.
    pub principal: String,
    /// Human-readable name, when the actor has set one.
    pub display_name: Option<String>,
}

/// Payload for registering a new land parcel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParcel {
    /// Registry-unique parcel identifier to claim.
    pub parcel_id: String,
    /// Geographic coordinates of the parcel boundary.
    pub geo_coordinates: String,
    /// Content hash of the deed document.
    pub deed_hash: String,
}

/// Payload for initiating an ownership transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOwnership {
    /// The parcel to transfer.
    pub parcel_id: String,
    /// The receiving owner.
    pub new_owner: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_wire_names() {
        let record = LandRecord {
            parcel_id: "P-100".into(),
            geo_coordinates: "47.60,-122.33".into(),
            deed_hash: "ab12".into(),
            current_owner: Some("alice".into()),
            status: RecordStatus::Active,
            registration_date: DateTime::<Utc>::UNIX_EPOCH,
        };

        let json = serde_json::to_value(&record).expect("serializes");
        assert_eq!(json["parcelId"], "P-100");
        assert_eq!(json["deedHash"], "ab12");
        assert_eq!(json["status"], "ACTIVE");
    }

    #[test]
    fn pending_transfer_round_trips() {
        let transfer = PendingTransfer {
            parcel_id: "P-7".into(),
            new_owner: "bob".into(),
            status: TransferStatus::Pending,
            initiated_date: DateTime::<Utc>::UNIX_EPOCH,
        };

        let json = serde_json::to_string(&transfer).expect("serializes");
        let back: PendingTransfer = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, transfer);
    }
}

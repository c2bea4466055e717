// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The remote boundary of the cadastre client.
//!
//! This crate defines everything the caching engine and the remote
//! land-registry service agree on:
//!
//! - The entity types held in the registry ([`LandRecord`],
//!   [`PendingTransfer`], [`UserProfile`]) and the mutation payloads
//!   ([`RegisterParcel`], [`TransferOwnership`]).
//! - The [`RemoteClient`] trait, one asynchronous operation per entity
//!   action, plus the readiness predicate that gates every call.
//! - The shared [`Error`] taxonomy: transport failures, registry
//!   rejections, and the not-ready session state.
//!
//! The `test-util` feature adds [`testing::MockRemote`], an in-memory
//! registry with operation recording and failure injection.

mod client;
mod error;
mod types;

#[cfg(any(feature = "test-util", test))]
pub mod testing;

pub use client::{LocalRemoteClient, RemoteClient};
pub use error::Error;
pub use types::{LandRecord, PendingTransfer, RecordStatus, RegisterParcel, TransferOwnership, TransferStatus, UserProfile};

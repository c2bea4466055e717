// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The shared error taxonomy for the remote-registry boundary.

/// Errors surfaced by the remote-registry boundary and stored in cache entries.
///
/// The taxonomy is deliberately closed: everything a remote call can do wrong
/// collapses into one of three shapes that callers react to differently.
/// A [`Transport`](Error::Transport) failure means the call never completed;
/// a [`Rejected`](Error::Rejected) failure means the registry refused the
/// operation; [`NotReady`](Error::NotReady) means no remote binding exists yet
/// (the session is still initializing) and no call was issued at all.
///
/// Errors are `Clone` because they are stored inside cache entries and
/// broadcast to every subscriber of a key.
///
/// # Examples
///
/// ```
/// use cadastre_remote::Error;
///
/// let err = Error::transport("connection reset");
/// assert!(err.is_transport());
/// assert_eq!(err.to_string(), "transport failure: connection reset");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The remote call failed to complete (network or availability fault).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote call completed but the registry refused the operation,
    /// e.g. a validation failure on the remote side.
    #[error("rejected by the registry: {0}")]
    Rejected(String),

    /// No remote binding is available yet; the call was not issued.
    #[error("remote binding is not ready")]
    NotReady,
}

impl Error {
    /// Creates a transport error from any displayable cause.
    pub fn transport(cause: impl Into<String>) -> Self {
        Self::Transport(cause.into())
    }

    /// Creates a rejection error carrying the registry's refusal message.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Returns `true` for [`Error::Transport`].
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` for [`Error::Rejected`].
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns `true` for [`Error::NotReady`].
    #[must_use]
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady)
    }
}

//! This module contains errors pertaining to the reconciliation of the local
//! deployment record against the state observed on chain.

use std::time::Duration;

use thiserror::Error;

use crate::chain::event::EventKind;

/// Errors that occur while observing the on-chain project or while driving a
/// reconciliation run against it.
///
/// Note that _drift_ between the recorded and observed state is never an
/// error; drift is delivered to the run's outcome policy as signals. The
/// variants here abort the run entirely.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The on-chain project contract could not be attached to, so no part of
    /// the run can proceed.
    #[error("Could not attach to the on-chain project: {message}")]
    AttachFailed { message: String },

    /// A historical event query did not return within the configured bound.
    ///
    /// The fetch is attempted exactly once; whether to retry after a timeout
    /// is a policy decision for the caller, not this library.
    #[error("Fetching {kind} events did not complete within {waited:?}")]
    EventTimeout { kind: EventKind, waited: Duration },

    /// The underlying provider failed to answer a query.
    #[error("The on-chain provider failed: {message}")]
    Provider { message: String },
}

/// The result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

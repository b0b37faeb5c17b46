//! This module contains the primary error type for the library's interface.
//! It also re-exports the more specific error types that are
//! subsystem-specific.

pub mod ast;
pub mod layout;
pub mod record;
pub mod sync;

use thiserror::Error;

/// The interface result type for the library.
///
/// # Usage
///
/// Any function considered to be part of the public interface of the library
/// should return this result type. Subsystems should return the more-specific
/// child error types as appropriate.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by
/// the clients of the library) should be members of this enum. Every variant
/// here is _fatal_ to the operation that raised it: expected divergence
/// between recorded and observed state is never represented as an error, but
/// as drift signals delivered to an outcome policy.
#[derive(Debug, Error)]
pub enum Error {
    /// Errors that come from indexing and resolving contract syntax trees.
    #[error(transparent)]
    Ast(#[from] ast::Error),

    /// Errors from the storage layout extraction and comparison subsystem.
    #[error(transparent)]
    Layout(#[from] layout::Error),

    /// Errors from loading and persisting deployment records.
    #[error(transparent)]
    Record(#[from] record::Error),

    /// Errors from the on-chain reconciliation subsystem.
    #[error(transparent)]
    Sync(#[from] sync::Error),
}

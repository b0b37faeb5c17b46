//! This module contains errors pertaining to loading and persisting the
//! per-network deployment record file.

use thiserror::Error;

/// Errors that occur while reading a deployment record from disk or writing
/// one back.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// The record file declares no schema version at all.
    ///
    /// Files produced by older tooling carry no version field, so the data
    /// needs migration before this library can interpret it safely.
    #[error(
        "The record at {path} declares no schema version and needs migration before it can be \
         loaded"
    )]
    SchemaMissing { path: String },

    /// The record file declares a schema version this library does not
    /// support.
    #[error(
        "The record at {path} declares unrecognized schema version {found} (this library supports \
         version {supported})"
    )]
    SchemaUnsupported {
        path:      String,
        found:     String,
        supported: String,
    },

    /// The record file could not be read from disk.
    #[error("Could not read the record at {path}: {message}")]
    Read { path: String, message: String },

    /// The record file exists and declares the right schema version but its
    /// content does not parse as a deployment record.
    #[error("Could not parse the record at {path}: {message}")]
    Parse { path: String, message: String },

    /// The record could not be written back to disk.
    #[error("Could not write the record at {path}: {message}")]
    Write { path: String, message: String },
}

/// The result type for deployment record persistence operations.
pub type Result<T> = std::result::Result<T, Error>;

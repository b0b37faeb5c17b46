//! This module contains errors pertaining to the indexing and resolution of
//! compiled contract syntax trees.

use thiserror::Error;

/// Errors that occur while looking up nodes in the indexed syntax trees of
/// the compiled artifacts.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// No compiled artifact exists for the named contract.
    #[error("No compiled artifact is available for contract {name}")]
    ArtifactNotFound { name: String },

    /// An artifact exists for the contract but its syntax tree does not
    /// contain a matching contract definition.
    #[error("The artifact at {path} does not define a contract named {name}")]
    ContractNotInArtifact { name: String, path: String },

    /// A node id was requested that does not exist in any indexed tree.
    #[error("No node with id {id} exists in the indexed syntax trees")]
    NodeNotFound { id: i64 },

    /// A node id was requested that exists more than once across the indexed
    /// trees.
    ///
    /// The compiler assigns ids uniquely within one compilation run, so a
    /// duplicate means the build directory mixes artifacts from different
    /// runs and its contents cannot be trusted.
    #[error(
        "Found {count} nodes with id {id}; the build artifacts appear to be corrupted or to mix \
         output from multiple compiler runs"
    )]
    AmbiguousNode { id: i64, count: usize },

    /// A base contract named in an inheritance chain could not be resolved to
    /// source data in any artifact.
    #[error(
        "Missing source data for a base contract (node id {id}) of {contract}. This usually means \
         a stale or incremental build, or a dependency providing a contract with the same name; \
         try cleaning the build artifacts and compiling again"
    )]
    MissingSourceData { contract: String, id: i64 },
}

/// The result type for operations that resolve syntax-tree data.
pub type Result<T> = std::result::Result<T, Error>;

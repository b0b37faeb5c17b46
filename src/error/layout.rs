//! This module contains errors pertaining to the extraction and comparison of
//! contract storage layouts.

use thiserror::Error;

/// Errors that occur while extracting a storage layout from a contract's
/// syntax tree, or while computing the edit sequence between two layouts.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// A state variable's type name is of a kind the extractor does not
    /// understand.
    #[error("Cannot derive a storage type for {type_string} (node type {node_type})")]
    UnsupportedType { node_type: String, type_string: String },

    /// The compiler artifact carries no type identifier for an elementary
    /// type, leaving nothing to derive a storage type id from.
    #[error("The compiled artifact carries no type identifier for variable {label}")]
    MissingTypeIdentifier { label: String },

    /// A referenced type definition resolved to a node that is not a struct,
    /// enum or contract definition.
    #[error("Node {id} was expected to define a type but is a {node_type}")]
    NotATypeDefinition { id: i64, node_type: String },

    /// The backtracking pass over the layout edit matrix reached a cell with
    /// no consistent predecessor.
    ///
    /// The matrix is constructed so that every cell is reachable from one of
    /// its neighbours, so this is a bug in the differ rather than a condition
    /// a caller can provoke.
    #[error(
        "No consistent edit step leads to cell ({row}, {column}) of the layout edit matrix; this \
         is a bug in the differ. Matrix:\n{matrix}"
    )]
    BacktrackFailed {
        row:    usize,
        column: usize,
        matrix: String,
    },
}

/// The result type for storage layout operations.
pub type Result<T> = std::result::Result<T, Error>;

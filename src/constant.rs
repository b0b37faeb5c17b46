//! This module contains constants that are needed throughout the codebase.

use std::time::Duration;

/// The schema version of the deployment record file format that this library
/// reads and writes.
///
/// Loading a record that declares any other version (or none at all) is an
/// error, as the data may need migration before it can be interpreted safely.
pub const RECORD_SCHEMA_VERSION: &str = "1.0";

/// The file-name prefix used when deriving the standard per-network record
/// path, producing names of the form `deployment.<network>.json`.
pub const RECORD_FILE_PREFIX: &str = "deployment";

/// The placeholder written into a bytecode digest field when the true digest
/// cannot be computed (for example when a repaired contract has no matching
/// local artifact).
///
/// A later comparison against this value always reports a mismatch instead of
/// silently passing.
pub const UNKNOWN_BYTECODE_DIGEST: &str = "unknown";

/// The cost of substituting one storage slot for another in the layout edit
/// matrix.
///
/// Substitution is priced above insertion and deletion so that a single
/// in-place change (cost 3) still beats an unpaired delete plus insert
/// (cost 4), while equal slots (cost 0) are always preferred to either.
pub const LAYOUT_SUBSTITUTION_COST: usize = 3;

/// The cost of inserting a storage slot in the layout edit matrix.
pub const LAYOUT_INSERTION_COST: usize = 2;

/// The cost of deleting a storage slot from the layout edit matrix.
pub const LAYOUT_DELETION_COST: usize = 2;

/// The default bound on how long a single historical event query may take
/// before the fetch is abandoned with a timeout error.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// The shorter event-query bound intended for automated test environments,
/// where a hung provider should fail the suite quickly rather than stall it.
pub const TEST_EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// The number of bytes occupied by the CBOR metadata length suffix at the end
/// of compiled contract bytecode.
pub const METADATA_LENGTH_SUFFIX_BYTES: usize = 2;

/// The opcode that pushes twenty bytes onto the EVM stack.
///
/// A deployed Solidity library begins with `PUSH20 <own address>` as part of
/// its call-protection guard, which is how library bytecode embeds its own
/// deployed address.
pub const PUSH20_OPCODE: u8 = 0x73;

/// The number of bytes in an EVM address.
pub const ADDRESS_LENGTH_BYTES: usize = 20;

/// The suffixes that the compiler appends to the type identifiers of
/// reference types depending on their data location.
///
/// Data location has no bearing on how a variable occupies storage, so these
/// are stripped when deriving a storage type id.
pub const TYPE_IDENTIFIER_LOCATION_SUFFIXES: [&str; 6] = [
    "_storage_ptr",
    "_storage",
    "_memory_ptr",
    "_memory",
    "_calldata_ptr",
    "_calldata",
];

/// The derived type id of the elementary address type, which contract-typed
/// variables degrade to.
pub const ADDRESS_TYPE_ID: &str = "t_address";

/// The derived type id of the opaque function-type placeholder.
pub const FUNCTION_TYPE_ID: &str = "t_function";

/// The marker used in derived array type ids for dynamically-sized arrays.
pub const DYNAMIC_LENGTH_MARKER: &str = "dyn";

//! This module contains the storage layout representation and the two
//! operations defined over it: extracting a layout from a contract's syntax
//! tree ([`extract`]) and computing the drift between two layouts ([`diff`]).
//!
//! Contract storage is append-only-safe: new state variables may be added
//! after the existing ones, but inserting, removing, retyping or reordering
//! variables shifts the slots of everything that follows and silently
//! corrupts the data a proxy already holds. The layout types here exist to
//! make that class of mistake detectable before an upgrade is deployed.

pub mod diff;
pub mod extract;

use derivative::Derivative;
use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::constant::DYNAMIC_LENGTH_MARKER;

/// One declared, non-constant state variable of a contract.
///
/// Slots are ordered by declaration, visiting the linearized base contracts
/// most-base-first, which mirrors how the compiler assigns storage. A slot is
/// immutable once extracted.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct StorageSlot {
    /// The name of the contract that declares the variable.
    pub contract: String,

    /// The path of the declaring source file, relative to the project root.
    pub path: String,

    /// The declared name of the variable.
    pub label: String,

    /// The derived id of the variable's type, resolvable in the accompanying
    /// type registry.
    #[serde(rename = "type")]
    pub type_id: String,

    /// The source span of the declaration, in the compiler's
    /// `start:length:file` form.
    pub src: String,
}

/// The kind of storage type a descriptor identifies.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Elementary,
    Array,
    Mapping,
    Struct,
    Enum,
}

/// The length of an array type.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ArrayLength {
    /// A compile-time fixed length.
    Fixed(u64),

    /// A dynamically-sized array, whose elements live at a hashed location.
    Dynamic,
}

/// Array lengths serialize as the literal number, or as the string `"dyn"`
/// for dynamic arrays, matching the derived type ids they appear in.
impl Serialize for ArrayLength {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Fixed(length) => serializer.serialize_u64(*length),
            Self::Dynamic => serializer.serialize_str(DYNAMIC_LENGTH_MARKER),
        }
    }
}

impl<'de> Deserialize<'de> for ArrayLength {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Marker(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(length) => Ok(Self::Fixed(length)),
            Raw::Marker(marker) if marker == DYNAMIC_LENGTH_MARKER => Ok(Self::Dynamic),
            Raw::Marker(marker) => Err(de::Error::custom(format!(
                "invalid array length marker {marker:?}"
            ))),
        }
    }
}

impl std::fmt::Display for ArrayLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(length) => write!(f, "{length}"),
            Self::Dynamic => write!(f, "{DYNAMIC_LENGTH_MARKER}"),
        }
    }
}

/// One member of a struct or enum type.
///
/// Struct members carry the member's type; enum members are bare labels.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct TypeMember {
    /// The declared name of the member.
    pub label: String,

    /// The derived type id of the member, absent for enum members.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub type_id: Option<String>,
}

/// A storage type, identified by an id derived from its shape.
///
/// # Identity
///
/// Two descriptors describe the same type if and only if their derived ids
/// are equal; equality and hashing deliberately consider nothing else. In
/// particular a mapping's key type is never part of the id, because keys are
/// hashed to a fixed-size slot and do not affect how the value is stored.
#[derive(Clone, Debug, Derivative, Deserialize, Eq, Serialize)]
#[derivative(Hash, PartialEq)]
pub struct TypeDescriptor {
    /// The derived id, e.g. `t_uint256`, `t_array:dyn<t_address>` or
    /// `t_struct<Vault.Position>`.
    pub id: String,

    /// The kind of type the descriptor identifies.
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub kind: TypeKind,

    /// The human-readable rendering of the type, for diagnostics.
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    pub label: String,

    /// The id of the contained value type, for arrays and mappings.
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    #[serde(rename = "valueType", skip_serializing_if = "Option::is_none", default)]
    pub value_type: Option<String>,

    /// The length of an array type.
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub length: Option<ArrayLength>,

    /// The members of a struct or enum type, in declaration order.
    #[derivative(Hash = "ignore", PartialEq = "ignore")]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub members: Option<Vec<TypeMember>>,
}

impl TypeDescriptor {
    /// Constructs a descriptor for an elementary type.
    #[must_use]
    pub fn elementary(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id:         id.into(),
            kind:       TypeKind::Elementary,
            label:      label.into(),
            value_type: None,
            length:     None,
            members:    None,
        }
    }
}

/// The registry of type descriptors referenced by a layout, in the order they
/// were first encountered.
pub type TypeRegistry = IndexMap<String, TypeDescriptor>;

/// The complete extracted storage layout of one contract: its ordered slots
/// and the registry resolving every type id they reference.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageLayout {
    /// The contract's storage slots in assignment order.
    pub storage: Vec<StorageSlot>,

    /// The descriptors for every type id referenced from `storage`,
    /// transitively.
    pub types: TypeRegistry,
}

impl StorageLayout {
    /// Gets the number of slots in the layout.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.storage.len()
    }

    /// Checks whether the layout has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

/// The kind of edit a single [`Operation`] applies to a layout.
///
/// `Insert` and `Delete` restructure storage in the middle of the sequence
/// and corrupt the slots that follow; `Append` and `Pop` act at the tail and
/// leave every existing slot where it was. Keeping the two pairs distinct is
/// the point of the diff.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Equal,
    Insert,
    Append,
    Delete,
    Pop,
    Rename,
    Typechange,
    Replace,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Equal => "equal",
            Self::Insert => "insert",
            Self::Append => "append",
            Self::Delete => "delete",
            Self::Pop => "pop",
            Self::Rename => "rename",
            Self::Typechange => "typechange",
            Self::Replace => "replace",
        };
        write!(f, "{name}")
    }
}

/// One unit of layout drift produced by [`diff::diff`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Operation {
    /// The kind of edit.
    pub action: Action,

    /// The slot in the original layout the edit removes or changes, present
    /// for `delete`, `pop`, `rename`, `typechange` and `replace`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original: Option<StorageSlot>,

    /// The slot in the updated layout the edit introduces or changes to,
    /// present for `insert`, `append`, `rename`, `typechange` and `replace`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub updated: Option<StorageSlot>,
}

pub use diff::diff;
pub use extract::LayoutExtractor;

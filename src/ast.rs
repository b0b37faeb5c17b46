//! This module contains the syntax-tree index over the compiled artifacts.
//!
//! The compiler assigns every node in a compilation run a numeric id, and
//! cross-references between nodes (base contracts, user-defined types) are
//! expressed through those ids. The [`AstIndex`] makes the id space of a
//! whole artifact set resolvable in one lookup, and is the only component
//! that understands how inheritance linearization maps onto storage slot
//! assignment.
//!
//! Only the subset of the syntax tree that storage extraction needs is
//! modelled; everything else in the artifact JSON is ignored during
//! deserialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    artifact::{ArtifactSet, SolcArtifact},
    error::ast::{Error, Result},
};

/// One node of a contract's syntax tree.
///
/// The compiler emits many node kinds; they are distinguished here by the
/// `node_type` string rather than an enum so that unknown kinds pass through
/// deserialization untouched.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AstNode {
    /// The node's id, unique within one compilation run.
    #[serde(default)]
    pub id: i64,

    /// The kind of node, e.g. `ContractDefinition` or `VariableDeclaration`.
    #[serde(default)]
    pub node_type: String,

    /// The declared name, for nodes that have one.
    #[serde(default)]
    pub name: Option<String>,

    /// The contract-qualified name, for struct and enum definitions.
    #[serde(default)]
    pub canonical_name: Option<String>,

    /// Whether a variable declaration is a compile-time constant.
    #[serde(default)]
    pub constant: Option<bool>,

    /// The declared mutability of a variable, e.g. `immutable`.
    #[serde(default)]
    pub mutability: Option<String>,

    /// The ids of a contract's bases in linearization order, most-derived
    /// first, with the contract's own id at the front.
    #[serde(default)]
    pub linearized_base_contracts: Vec<i64>,

    /// Child declarations of a source unit or contract definition.
    #[serde(default)]
    pub nodes: Vec<AstNode>,

    /// Member declarations of a struct or enum definition.
    #[serde(default)]
    pub members: Vec<AstNode>,

    /// The declared type of a variable.
    #[serde(default)]
    pub type_name: Option<TypeName>,

    /// The node's source span, in the compiler's `start:length:file` form.
    #[serde(default)]
    pub src: Option<String>,
}

impl AstNode {
    /// Checks whether the node declares a state variable that occupies a
    /// storage slot.
    ///
    /// Constants are inlined at their use sites and immutables live in code,
    /// so neither occupies storage.
    #[must_use]
    pub fn occupies_storage(&self) -> bool {
        self.node_type == "VariableDeclaration"
            && self.constant != Some(true)
            && self.mutability.as_deref() != Some("immutable")
    }
}

/// The declared type of a state variable, as the compiler describes it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeName {
    /// The kind of type name, e.g. `ElementaryTypeName` or `Mapping`.
    #[serde(default)]
    pub node_type: String,

    /// The compiler's canonical descriptions of the type.
    #[serde(default)]
    pub type_descriptions: TypeDescriptions,

    /// The element type of an array.
    #[serde(default)]
    pub base_type: Option<Box<TypeName>>,

    /// The key type of a mapping.
    #[serde(default)]
    pub key_type: Option<Box<TypeName>>,

    /// The value type of a mapping.
    #[serde(default)]
    pub value_type: Option<Box<TypeName>>,

    /// The length expression of a fixed-size array, absent for dynamic ones.
    #[serde(default)]
    pub length: Option<LengthExpression>,

    /// The id of the definition a user-defined type name refers to.
    #[serde(default)]
    pub referenced_declaration: Option<i64>,
}

/// The compiler's two canonical renderings of a type: the identifier used in
/// mangled symbol names and the human-readable string.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptions {
    /// The mangled type identifier, e.g. `t_uint256` or
    /// `t_struct$_Checkpoint_$102_storage`.
    #[serde(default)]
    pub type_identifier: Option<String>,

    /// The human-readable type string, e.g. `mapping(address => uint256)`.
    #[serde(default)]
    pub type_string: Option<String>,
}

/// The length expression of a fixed-size array type.
///
/// Only literal lengths carry a `value`; a length given by a constant
/// expression the compiler chose not to fold arrives without one.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LengthExpression {
    /// The literal value of the expression, when the compiler provides one.
    #[serde(default)]
    pub value: Option<String>,
}

/// An index of every syntax-tree node reachable from an artifact set, keyed
/// by node id.
///
/// Node ids are unique within one compilation run, so a well-formed build
/// directory indexes every id exactly once. Duplicate ids are retained and
/// surfaced as [`Error::AmbiguousNode`] on lookup, because they mean the
/// build directory mixes output from different compiler runs and nothing
/// resolved through it can be trusted.
#[derive(Debug)]
pub struct AstIndex<'a> {
    artifacts: &'a ArtifactSet,
    nodes:     HashMap<i64, Vec<(&'a AstNode, &'a SolcArtifact)>>,
}

impl<'a> AstIndex<'a> {
    /// Builds an index over every node reachable through the declaration and
    /// member lists of the artifacts in `artifacts`.
    #[must_use]
    pub fn new(artifacts: &'a ArtifactSet) -> Self {
        let mut nodes: HashMap<i64, Vec<(&'a AstNode, &'a SolcArtifact)>> = HashMap::new();
        for artifact in artifacts {
            let mut stack = vec![&artifact.ast];
            while let Some(node) = stack.pop() {
                nodes.entry(node.id).or_default().push((node, artifact));
                stack.extend(node.nodes.iter());
                stack.extend(node.members.iter());
            }
        }
        Self { artifacts, nodes }
    }

    /// Gets the artifact set the index was built over.
    #[must_use]
    pub fn artifacts(&self) -> &'a ArtifactSet {
        self.artifacts
    }

    /// Resolves the node with the provided `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] if no indexed node carries the id, and
    /// [`Error::AmbiguousNode`] if more than one does.
    pub fn node(&self, id: i64) -> Result<&'a AstNode> {
        self.definition_of(id).map(|(node, _)| node)
    }

    /// Resolves the node with the provided `id` together with the artifact
    /// that declares it, for diagnostics that need the source path.
    pub fn definition_of(&self, id: i64) -> Result<(&'a AstNode, &'a SolcArtifact)> {
        match self.nodes.get(&id).map(Vec::as_slice) {
            None | Some([]) => Err(Error::NodeNotFound { id }),
            Some([unique]) => Ok(*unique),
            Some(found) => Err(Error::AmbiguousNode {
                id,
                count: found.len(),
            }),
        }
    }

    /// Resolves the contract definition node for the contract named `name`,
    /// together with its declaring artifact.
    pub fn contract_definition(&self, name: &str) -> Result<(&'a AstNode, &'a SolcArtifact)> {
        let artifact = self
            .artifacts
            .get(name)
            .ok_or_else(|| Error::ArtifactNotFound {
                name: name.to_string(),
            })?;
        artifact
            .ast
            .nodes
            .iter()
            .find(|node| {
                node.node_type == "ContractDefinition" && node.name.as_deref() == Some(name)
            })
            .map(|node| (node, artifact))
            .ok_or_else(|| Error::ContractNotInArtifact {
                name: name.to_string(),
                path: artifact.source_path.clone(),
            })
    }

    /// Resolves the linearized base contracts of the contract named `name`,
    /// ordered most-base-first.
    ///
    /// The compiler exposes the linearization most-derived-first, which is
    /// the method resolution order; storage slots are assigned in the
    /// opposite order, so the chain is reversed here.
    ///
    /// # Errors
    ///
    /// A base id that cannot be resolved fails with
    /// [`Error::MissingSourceData`], which usually means a stale incremental
    /// build or a dependency shadowing a contract name.
    pub fn linearized_bases(&self, name: &str) -> Result<Vec<(&'a AstNode, &'a SolcArtifact)>> {
        let (contract, _) = self.contract_definition(name)?;
        contract
            .linearized_base_contracts
            .iter()
            .rev()
            .map(|id| {
                self.definition_of(*id).map_err(|_| Error::MissingSourceData {
                    contract: name.to_string(),
                    id:       *id,
                })
            })
            .collect()
    }
}

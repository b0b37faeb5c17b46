//! This module contains the storage layout extractor, which walks a
//! contract's indexed syntax tree and produces its [`StorageLayout`].

use std::path::PathBuf;

use tracing::warn;

use crate::{
    ast::{AstIndex, AstNode, TypeName},
    constant::{
        ADDRESS_TYPE_ID,
        FUNCTION_TYPE_ID,
        TYPE_IDENTIFIER_LOCATION_SUFFIXES,
    },
    error::{layout, Result},
    layout::{
        ArrayLength,
        StorageLayout,
        StorageSlot,
        TypeDescriptor,
        TypeKind,
        TypeMember,
        TypeRegistry,
    },
    utility::relative_to,
};

/// The extractor for contract storage layouts.
///
/// One extractor can serve any number of `extract` calls over the same
/// artifact set; the type registry is built fresh per extraction, because
/// derived type ids are only meaningful relative to the artifacts of one
/// compilation run.
#[derive(Debug)]
pub struct LayoutExtractor<'a> {
    /// The index resolving node ids across the compiled artifacts.
    index: &'a AstIndex<'a>,

    /// The root against which source paths are relativised.
    project_root: PathBuf,
}

impl<'a> LayoutExtractor<'a> {
    /// Constructs a new extractor over `index`, recording source paths
    /// relative to `project_root`.
    #[must_use]
    pub fn new(index: &'a AstIndex<'a>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            index,
            project_root: project_root.into(),
        }
    }

    /// Extracts the storage layout of the contract named `contract`.
    ///
    /// Slots appear in storage assignment order: the linearized base
    /// contracts are visited most-base-first, and within each contract the
    /// state variables in declaration order. Constants and immutables occupy
    /// no storage and produce no slot.
    ///
    /// # Errors
    ///
    /// Fails if the contract or any of its bases cannot be resolved in the
    /// index, or if a state variable's type is of a kind the extractor does
    /// not understand.
    pub fn extract(&self, contract: &str) -> Result<StorageLayout> {
        let mut types = TypeRegistry::new();
        let mut storage = Vec::new();

        for (base, artifact) in self.index.linearized_bases(contract)? {
            for variable in base.nodes.iter().filter(|node| node.occupies_storage()) {
                let type_id = self.storage_type(variable, &mut types)?;
                storage.push(StorageSlot {
                    contract: base.name.clone().unwrap_or_default(),
                    path: relative_to(&artifact.source_path, &self.project_root),
                    label: variable.name.clone().unwrap_or_default(),
                    type_id,
                    src: variable.src.clone().unwrap_or_default(),
                });
            }
        }

        Ok(StorageLayout { storage, types })
    }

    /// Derives the storage type id for the declared type of `variable`,
    /// registering a descriptor for it (and every type it contains) in
    /// `types`.
    fn storage_type(&self, variable: &AstNode, types: &mut TypeRegistry) -> Result<String> {
        let label = variable.name.clone().unwrap_or_default();
        let type_name = variable
            .type_name
            .as_ref()
            .ok_or(layout::Error::MissingTypeIdentifier { label })?;
        self.resolve_type(type_name, types)
    }

    /// Derives the id for `type_name`, recursing into contained types.
    fn resolve_type(&self, type_name: &TypeName, types: &mut TypeRegistry) -> Result<String> {
        match type_name.node_type.as_str() {
            "ElementaryTypeName" => Ok(Self::elementary_type(type_name, types)?),
            "ArrayTypeName" => self.array_type(type_name, types),
            "Mapping" => self.mapping_type(type_name, types),
            "UserDefinedTypeName" => self.user_defined_type(type_name, types),
            "FunctionTypeName" => {
                // Function-typed variables occupy a slot like any other word;
                // their signatures have no bearing on storage shape.
                types
                    .entry(FUNCTION_TYPE_ID.to_string())
                    .or_insert_with(|| TypeDescriptor::elementary(FUNCTION_TYPE_ID, "function"));
                Ok(FUNCTION_TYPE_ID.to_string())
            }
            other => Err(layout::Error::UnsupportedType {
                node_type:   other.to_string(),
                type_string: Self::type_string(type_name),
            }
            .into()),
        }
    }

    /// Derives the id for an elementary type from the compiler's type
    /// identifier, stripped of its data-location suffix.
    fn elementary_type(
        type_name: &TypeName,
        types: &mut TypeRegistry,
    ) -> std::result::Result<String, layout::Error> {
        let identifier = type_name
            .type_descriptions
            .type_identifier
            .as_deref()
            .ok_or_else(|| layout::Error::MissingTypeIdentifier {
                label: Self::type_string(type_name),
            })?;

        let mut id = identifier;
        for suffix in TYPE_IDENTIFIER_LOCATION_SUFFIXES {
            if let Some(stripped) = id.strip_suffix(suffix) {
                id = stripped;
                break;
            }
        }

        types
            .entry(id.to_string())
            .or_insert_with(|| TypeDescriptor::elementary(id, Self::type_string(type_name)));
        Ok(id.to_string())
    }

    /// Derives the id for an array type, parameterized by the element type
    /// and the length.
    fn array_type(&self, type_name: &TypeName, types: &mut TypeRegistry) -> Result<String> {
        let element = type_name.base_type.as_deref().ok_or_else(|| {
            layout::Error::UnsupportedType {
                node_type:   "ArrayTypeName".to_string(),
                type_string: Self::type_string(type_name),
            }
        })?;
        let element_id = self.resolve_type(element, types)?;

        let length = match &type_name.length {
            None => ArrayLength::Dynamic,
            Some(expression) => match expression.value.as_deref().map(str::parse) {
                Some(Ok(length)) => ArrayLength::Fixed(length),
                _ => {
                    // A length the compiler did not fold to a literal still
                    // yields a valid (if over-general) id.
                    warn!(
                        type_string = %Self::type_string(type_name),
                        "Array length is not a literal; treating as dynamic"
                    );
                    ArrayLength::Dynamic
                }
            },
        };

        let id = format!("t_array:{length}<{element_id}>");
        types.entry(id.clone()).or_insert_with(|| TypeDescriptor {
            id:         id.clone(),
            kind:       TypeKind::Array,
            label:      Self::type_string(type_name),
            value_type: Some(element_id),
            length:     Some(length),
            members:    None,
        });
        Ok(id)
    }

    /// Derives the id for a mapping type.
    ///
    /// Only the value-type chain contributes to the id; mapping keys are
    /// hashed to a fixed-size slot and never affect storage shape.
    fn mapping_type(&self, type_name: &TypeName, types: &mut TypeRegistry) -> Result<String> {
        let value = type_name.value_type.as_deref().ok_or_else(|| {
            layout::Error::UnsupportedType {
                node_type:   "Mapping".to_string(),
                type_string: Self::type_string(type_name),
            }
        })?;
        let value_id = self.resolve_type(value, types)?;

        let id = format!("t_mapping<{value_id}>");
        types.entry(id.clone()).or_insert_with(|| TypeDescriptor {
            id:         id.clone(),
            kind:       TypeKind::Mapping,
            label:      Self::type_string(type_name),
            value_type: Some(value_id),
            length:     None,
            members:    None,
        });
        Ok(id)
    }

    /// Derives the id for a user-defined type reference: a struct, an enum,
    /// or a contract.
    fn user_defined_type(&self, type_name: &TypeName, types: &mut TypeRegistry) -> Result<String> {
        let referenced = type_name.referenced_declaration.ok_or_else(|| {
            layout::Error::UnsupportedType {
                node_type:   "UserDefinedTypeName".to_string(),
                type_string: Self::type_string(type_name),
            }
        })?;
        let definition = self.index.node(referenced)?;

        match definition.node_type.as_str() {
            "StructDefinition" => self.struct_type(definition, types),
            "EnumDefinition" => Ok(Self::enum_type(definition, types)),
            "ContractDefinition" => {
                // A contract-typed variable stores only the address, so it
                // degrades to the address type.
                types
                    .entry(ADDRESS_TYPE_ID.to_string())
                    .or_insert_with(|| TypeDescriptor::elementary(ADDRESS_TYPE_ID, "address"));
                Ok(ADDRESS_TYPE_ID.to_string())
            }
            other => Err(layout::Error::NotATypeDefinition {
                id:        referenced,
                node_type: other.to_string(),
            }
            .into()),
        }
    }

    /// Derives the id for a struct type, registering a stub descriptor
    /// before recursing into the members so that self-referential and
    /// mutually referential structs terminate.
    fn struct_type(&self, definition: &AstNode, types: &mut TypeRegistry) -> Result<String> {
        let id = format!("t_struct<{}>", Self::canonical_name(definition));
        if types.contains_key(&id) {
            return Ok(id);
        }

        types.insert(id.clone(), TypeDescriptor {
            id:         id.clone(),
            kind:       TypeKind::Struct,
            label:      format!("struct {}", Self::canonical_name(definition)),
            value_type: None,
            length:     None,
            members:    None,
        });

        let mut members = Vec::with_capacity(definition.members.len());
        for member in &definition.members {
            let member_type = self.storage_type(member, types)?;
            members.push(TypeMember {
                label:   member.name.clone().unwrap_or_default(),
                type_id: Some(member_type),
            });
        }

        // The stub is guaranteed present: nothing removes registry entries,
        // and recursion only ever adds.
        if let Some(descriptor) = types.get_mut(&id) {
            descriptor.members = Some(members);
        }
        Ok(id)
    }

    /// Derives the id for an enum type.
    fn enum_type(definition: &AstNode, types: &mut TypeRegistry) -> String {
        let id = format!("t_enum<{}>", Self::canonical_name(definition));
        types.entry(id.clone()).or_insert_with(|| TypeDescriptor {
            id:         id.clone(),
            kind:       TypeKind::Enum,
            label:      format!("enum {}", Self::canonical_name(definition)),
            value_type: None,
            length:     None,
            members:    Some(
                definition
                    .members
                    .iter()
                    .map(|member| TypeMember {
                        label:   member.name.clone().unwrap_or_default(),
                        type_id: None,
                    })
                    .collect(),
            ),
        });
        id
    }

    /// Gets the contract-qualified name of a struct or enum definition, so
    /// that identically named types in different contracts never collide.
    fn canonical_name(definition: &AstNode) -> String {
        definition
            .canonical_name
            .clone()
            .or_else(|| definition.name.clone())
            .unwrap_or_default()
    }

    /// Gets the compiler's human-readable rendering of `type_name`, for
    /// labels and diagnostics.
    fn type_string(type_name: &TypeName) -> String {
        type_name
            .type_descriptions
            .type_string
            .clone()
            .unwrap_or_else(|| type_name.node_type.clone())
    }
}

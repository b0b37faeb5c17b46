//! Tests the extraction of storage layouts from indexed contract syntax
//! trees.

mod common;

use deployment_drift_analyzer::{
    artifact::ArtifactSet,
    ast::AstIndex,
    error::{ast, Error},
    layout::{ArrayLength, LayoutExtractor, TypeKind},
};
use serde_json::json;

use crate::common::{
    array,
    build_artifact,
    constant_variable,
    contract_definition,
    elementary,
    enum_definition,
    immutable_variable,
    mapping,
    struct_definition,
    user_defined,
    variable,
};

fn uint256() -> serde_json::Value {
    elementary("t_uint256", "uint256")
}

fn address_type() -> serde_json::Value {
    elementary("t_address", "address")
}

#[test]
fn orders_slots_base_contracts_first() -> anyhow::Result<()> {
    common::init_tracing();

    let parent = contract_definition(10, "Parent", vec![10], vec![variable(11, "a", uint256())]);
    let child = contract_definition(
        20,
        "Child",
        vec![20, 10],
        vec![variable(21, "b", address_type())],
    );

    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("Parent", "/work/contracts/Parent.sol", 1, vec![parent]));
    artifacts.insert(build_artifact(
        "Child",
        "/work/contracts/Child.sol",
        2,
        vec![child],
    ));

    let index = AstIndex::new(&artifacts);
    let layout = LayoutExtractor::new(&index, "/work").extract("Child")?;

    let labels: Vec<_> = layout.storage.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["a", "b"]);
    assert_eq!(layout.storage[0].contract, "Parent");
    assert_eq!(layout.storage[0].path, "contracts/Parent.sol");
    assert_eq!(layout.storage[1].contract, "Child");
    Ok(())
}

#[test]
fn constants_and_immutables_occupy_no_slot() -> anyhow::Result<()> {
    let contract = contract_definition(10, "Token", vec![10], vec![
        constant_variable(11, "DECIMALS", uint256()),
        immutable_variable(12, "deployer", address_type()),
        variable(13, "supply", uint256()),
    ]);

    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("Token", "/work/contracts/Token.sol", 1, vec![contract]));

    let index = AstIndex::new(&artifacts);
    let layout = LayoutExtractor::new(&index, "/work").extract("Token")?;

    assert_eq!(layout.slot_count(), 1);
    assert_eq!(layout.storage[0].label, "supply");
    Ok(())
}

#[test]
fn mapping_ids_ignore_the_key_type() -> anyhow::Result<()> {
    let contract = contract_definition(10, "Token", vec![10], vec![
        variable(
            11,
            "by_address",
            mapping(address_type(), uint256(), "mapping(address => uint256)"),
        ),
        variable(
            12,
            "by_id",
            mapping(uint256(), uint256(), "mapping(uint256 => uint256)"),
        ),
    ]);

    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("Token", "/work/contracts/Token.sol", 1, vec![contract]));

    let index = AstIndex::new(&artifacts);
    let layout = LayoutExtractor::new(&index, "/work").extract("Token")?;

    assert_eq!(layout.storage[0].type_id, "t_mapping<t_uint256>");
    assert_eq!(layout.storage[0].type_id, layout.storage[1].type_id);

    let descriptor = &layout.types["t_mapping<t_uint256>"];
    assert_eq!(descriptor.kind, TypeKind::Mapping);
    assert_eq!(descriptor.value_type.as_deref(), Some("t_uint256"));
    Ok(())
}

#[test]
fn array_ids_are_parameterized_by_length() -> anyhow::Result<()> {
    let contract = contract_definition(10, "Token", vec![10], vec![
        variable(11, "open", array(uint256(), None, "uint256[]")),
        variable(12, "fixed", array(uint256(), Some(5), "uint256[5]")),
    ]);

    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("Token", "/work/contracts/Token.sol", 1, vec![contract]));

    let index = AstIndex::new(&artifacts);
    let layout = LayoutExtractor::new(&index, "/work").extract("Token")?;

    assert_eq!(layout.storage[0].type_id, "t_array:dyn<t_uint256>");
    assert_eq!(layout.storage[1].type_id, "t_array:5<t_uint256>");
    assert_eq!(
        layout.types["t_array:5<t_uint256>"].length,
        Some(ArrayLength::Fixed(5))
    );
    assert_eq!(
        layout.types["t_array:dyn<t_uint256>"].length,
        Some(ArrayLength::Dynamic)
    );
    Ok(())
}

#[test]
fn self_referential_structs_terminate() -> anyhow::Result<()> {
    let node_struct = struct_definition(30, "List.Node", vec![
        variable(31, "next", user_defined(30, "struct List.Node")),
        variable(32, "value", uint256()),
    ]);
    let contract = contract_definition(10, "List", vec![10], vec![
        node_struct,
        variable(11, "head", user_defined(30, "struct List.Node")),
    ]);

    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("List", "/work/contracts/List.sol", 1, vec![contract]));

    let index = AstIndex::new(&artifacts);
    let layout = LayoutExtractor::new(&index, "/work").extract("List")?;

    assert_eq!(layout.storage[0].type_id, "t_struct<List.Node>");
    let descriptor = &layout.types["t_struct<List.Node>"];
    assert_eq!(descriptor.kind, TypeKind::Struct);

    let members = descriptor.members.as_ref().unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].type_id.as_deref(), Some("t_struct<List.Node>"));
    assert_eq!(members[1].type_id.as_deref(), Some("t_uint256"));
    Ok(())
}

#[test]
fn mutually_recursive_structs_terminate() -> anyhow::Result<()> {
    // Node and Edge refer to each other; the stub registered before member
    // recursion must break the cycle in both directions.
    let node_struct = struct_definition(30, "Graph.Node", vec![variable(
        31,
        "out",
        user_defined(40, "struct Graph.Edge"),
    )]);
    let edge_struct = struct_definition(40, "Graph.Edge", vec![
        variable(41, "to", user_defined(30, "struct Graph.Node")),
        variable(42, "weight", uint256()),
    ]);
    let contract = contract_definition(10, "Graph", vec![10], vec![
        node_struct,
        edge_struct,
        variable(11, "root", user_defined(30, "struct Graph.Node")),
    ]);

    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("Graph", "/work/contracts/Graph.sol", 1, vec![contract]));

    let index = AstIndex::new(&artifacts);
    let layout = LayoutExtractor::new(&index, "/work").extract("Graph")?;

    assert_eq!(layout.storage[0].type_id, "t_struct<Graph.Node>");
    let node = layout.types["t_struct<Graph.Node>"].members.as_ref().unwrap();
    assert_eq!(node[0].type_id.as_deref(), Some("t_struct<Graph.Edge>"));
    let edge = layout.types["t_struct<Graph.Edge>"].members.as_ref().unwrap();
    assert_eq!(edge[0].type_id.as_deref(), Some("t_struct<Graph.Node>"));

    // One descriptor per canonical name, nothing duplicated by the cycle.
    let structs = layout
        .types
        .keys()
        .filter(|id| id.starts_with("t_struct<"))
        .count();
    assert_eq!(structs, 2);
    Ok(())
}

#[test]
fn contract_references_degrade_to_the_address_type() -> anyhow::Result<()> {
    let other = contract_definition(40, "Registry", vec![40], vec![]);
    let contract = contract_definition(10, "Token", vec![10], vec![variable(
        11,
        "registry",
        user_defined(40, "contract Registry"),
    )]);

    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("Registry", "/work/contracts/Registry.sol", 1, vec![other]));
    artifacts.insert(build_artifact("Token", "/work/contracts/Token.sol", 2, vec![contract]));

    let index = AstIndex::new(&artifacts);
    let layout = LayoutExtractor::new(&index, "/work").extract("Token")?;

    assert_eq!(layout.storage[0].type_id, "t_address");
    Ok(())
}

#[test]
fn enums_resolve_by_canonical_name_with_bare_member_labels() -> anyhow::Result<()> {
    let state = enum_definition(50, "Token.State", &["Open", "Frozen"]);
    let contract = contract_definition(10, "Token", vec![10], vec![
        state,
        variable(11, "state", user_defined(50, "enum Token.State")),
    ]);

    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("Token", "/work/contracts/Token.sol", 1, vec![contract]));

    let index = AstIndex::new(&artifacts);
    let layout = LayoutExtractor::new(&index, "/work").extract("Token")?;

    assert_eq!(layout.storage[0].type_id, "t_enum<Token.State>");
    let members = layout.types["t_enum<Token.State>"].members.as_ref().unwrap();
    assert_eq!(members[0].label, "Open");
    assert!(members[0].type_id.is_none());
    Ok(())
}

#[test]
fn an_unresolvable_base_reports_missing_source_data() {
    // Child claims a base with id 99 that no artifact provides.
    let child = contract_definition(20, "Child", vec![20, 99], vec![]);
    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("Child", "/work/contracts/Child.sol", 1, vec![child]));

    let index = AstIndex::new(&artifacts);
    let result = LayoutExtractor::new(&index, "/work").extract("Child");

    assert!(matches!(
        result,
        Err(Error::Ast(ast::Error::MissingSourceData { id: 99, .. }))
    ));
}

#[test]
fn an_unknown_type_kind_is_rejected() {
    let contract = contract_definition(10, "Odd", vec![10], vec![variable(
        11,
        "strange",
        json!({ "nodeType": "SomethingNew", "typeDescriptions": { "typeString": "?" } }),
    )]);
    let mut artifacts = ArtifactSet::new();
    artifacts.insert(build_artifact("Odd", "/work/contracts/Odd.sol", 1, vec![contract]));

    let index = AstIndex::new(&artifacts);
    let result = LayoutExtractor::new(&index, "/work").extract("Odd");
    assert!(matches!(result, Err(Error::Layout(_))));
}

//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]
#![allow(dead_code)] // Each test binary uses only a subset of these helpers.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicUsize, Ordering},
};

use alloy_primitives::Address;
use async_trait::async_trait;
use deployment_drift_analyzer::{
    artifact::SolcArtifact,
    chain::{
        event::{ChainEvent, EventKind},
        ProjectHandle,
    },
    error::sync::{Error, Result},
    layout::StorageSlot,
};
use serde_json::{json, Value};

/// Installs a tracing subscriber honouring `RUST_LOG`, ignoring the error if
/// one is already installed by another test in the same binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Constructs an address whose final byte is `last`, for readable test data.
#[must_use]
pub fn addr(last: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = last;
    Address::from(bytes)
}

/// Constructs a storage slot with the provided `label` and `type_id`, with
/// the positional fields held constant.
#[must_use]
pub fn slot(label: &str, type_id: &str) -> StorageSlot {
    StorageSlot {
        contract: "Example".to_string(),
        path:     "contracts/Example.sol".to_string(),
        label:    label.to_string(),
        type_id:  type_id.to_string(),
        src:      "0:0:0".to_string(),
    }
}

/// Constructs deployed bytecode that carries no metadata suffix, so digests
/// in tests cover the bytes exactly as written.
#[must_use]
pub fn plain_code(seed: u8) -> Vec<u8> {
    vec![0x60, seed, 0x60, 0x40]
}

/// Constructs deployed bytecode carrying the Solidity library call-protection
/// guard, with `self_address` embedded as the library's own address.
#[must_use]
pub fn library_code(self_address: Address) -> Vec<u8> {
    let mut code = vec![0x73];
    code.extend_from_slice(self_address.as_slice());
    code.extend_from_slice(&[0x30, 0x14, 0x60, 0x80]);
    code
}

// === Syntax-tree builders ===================================================

/// Builds an elementary type-name node.
#[must_use]
pub fn elementary(identifier: &str, type_string: &str) -> Value {
    json!({
        "nodeType": "ElementaryTypeName",
        "typeDescriptions": {
            "typeIdentifier": identifier,
            "typeString": type_string,
        },
    })
}

/// Builds a mapping type-name node.
#[must_use]
pub fn mapping(key: Value, value: Value, type_string: &str) -> Value {
    json!({
        "nodeType": "Mapping",
        "keyType": key,
        "valueType": value,
        "typeDescriptions": { "typeString": type_string },
    })
}

/// Builds an array type-name node; `length` of `None` makes it dynamic.
#[must_use]
pub fn array(element: Value, length: Option<u64>, type_string: &str) -> Value {
    let mut node = json!({
        "nodeType": "ArrayTypeName",
        "baseType": element,
        "typeDescriptions": { "typeString": type_string },
    });
    if let Some(length) = length {
        node["length"] = json!({ "value": length.to_string() });
    }
    node
}

/// Builds a user-defined type-name node referring to the definition with the
/// provided `id`.
#[must_use]
pub fn user_defined(id: i64, type_string: &str) -> Value {
    json!({
        "nodeType": "UserDefinedTypeName",
        "referencedDeclaration": id,
        "typeDescriptions": { "typeString": type_string },
    })
}

/// Builds a state-variable declaration node.
#[must_use]
pub fn variable(id: i64, name: &str, type_name: Value) -> Value {
    json!({
        "id": id,
        "nodeType": "VariableDeclaration",
        "name": name,
        "src": format!("{}:10:0", id * 100),
        "typeName": type_name,
    })
}

/// Builds a constant state-variable declaration node, which occupies no
/// storage.
#[must_use]
pub fn constant_variable(id: i64, name: &str, type_name: Value) -> Value {
    let mut node = variable(id, name, type_name);
    node["constant"] = json!(true);
    node
}

/// Builds an immutable state-variable declaration node, which occupies no
/// storage.
#[must_use]
pub fn immutable_variable(id: i64, name: &str, type_name: Value) -> Value {
    let mut node = variable(id, name, type_name);
    node["mutability"] = json!("immutable");
    node
}

/// Builds a struct definition node with the provided member declarations.
#[must_use]
pub fn struct_definition(id: i64, canonical_name: &str, members: Vec<Value>) -> Value {
    json!({
        "id": id,
        "nodeType": "StructDefinition",
        "name": canonical_name.rsplit('.').next().unwrap(),
        "canonicalName": canonical_name,
        "members": members,
    })
}

/// Builds an enum definition node with the provided member names.
#[must_use]
pub fn enum_definition(id: i64, canonical_name: &str, members: &[&str]) -> Value {
    let members: Vec<Value> = members
        .iter()
        .enumerate()
        .map(|(i, name)| {
            json!({
                "id": id * 1000 + i as i64 + 1,
                "nodeType": "EnumValue",
                "name": name,
            })
        })
        .collect();
    json!({
        "id": id,
        "nodeType": "EnumDefinition",
        "name": canonical_name.rsplit('.').next().unwrap(),
        "canonicalName": canonical_name,
        "members": members,
    })
}

/// Builds a contract definition node.
///
/// `bases` is the compiler's linearization order: most-derived first, with
/// the contract's own id at the front.
#[must_use]
pub fn contract_definition(id: i64, name: &str, bases: Vec<i64>, nodes: Vec<Value>) -> Value {
    json!({
        "id": id,
        "nodeType": "ContractDefinition",
        "name": name,
        "linearizedBaseContracts": bases,
        "nodes": nodes,
    })
}

/// Builds a complete compiled artifact holding the provided top-level nodes
/// under a source unit with the provided `unit_id`.
#[must_use]
pub fn build_artifact(
    contract_name: &str,
    source_path: &str,
    unit_id: i64,
    nodes: Vec<Value>,
) -> SolcArtifact {
    serde_json::from_value(json!({
        "contractName": contract_name,
        "sourcePath": source_path,
        "abi": [],
        "bytecode": "0x",
        "deployedBytecode": "0x",
        "ast": {
            "id": unit_id,
            "nodeType": "SourceUnit",
            "nodes": nodes,
        },
    }))
    .expect("artifact JSON is well-formed")
}

// === An in-memory project handle ============================================

/// An in-memory stand-in for the live on-chain project, backed by canned
/// event streams and code.
#[derive(Debug, Default)]
pub struct MockProject {
    /// The version the project declares on chain.
    pub version: String,

    /// The project's package contract address.
    pub package: Address,

    /// The project's provider contract address.
    pub provider: Address,

    /// The canned implementation-registered event stream.
    pub implementation_events: Vec<ChainEvent>,

    /// The canned proxy-created event stream.
    pub proxy_events: Vec<ChainEvent>,

    /// The canned dependency-registered event stream.
    pub dependency_events: Vec<ChainEvent>,

    /// The implementation address each proxy currently delegates to.
    pub implementations: HashMap<Address, Address>,

    /// The deployed code at each address.
    pub code: HashMap<Address, Vec<u8>>,

    /// Makes `attach` fail, aborting any run immediately.
    pub attach_fails: bool,

    /// Makes `events` hang forever instead of answering.
    pub hang_events: bool,

    /// Makes `events` fail with a provider error.
    pub events_fail: bool,

    /// Counts how many times `events` has been queried.
    pub event_queries: AtomicUsize,
}

#[async_trait]
impl ProjectHandle for MockProject {
    async fn attach(&self) -> Result<()> {
        if self.attach_fails {
            return Err(Error::Provider {
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    async fn package_address(&self) -> Result<Address> {
        Ok(self.package)
    }

    async fn provider_address(&self) -> Result<Address> {
        Ok(self.provider)
    }

    async fn events(&self, kind: EventKind) -> Result<Vec<ChainEvent>> {
        self.event_queries.fetch_add(1, Ordering::SeqCst);
        if self.hang_events {
            futures::future::pending::<()>().await;
        }
        if self.events_fail {
            return Err(Error::Provider {
                message: "log query failed".to_string(),
            });
        }
        Ok(match kind {
            EventKind::ImplementationRegistered => self.implementation_events.clone(),
            EventKind::ProxyCreated => self.proxy_events.clone(),
            EventKind::DependencyRegistered => self.dependency_events.clone(),
        })
    }

    async fn implementation_of(&self, proxy: Address) -> Result<Address> {
        Ok(self.implementations.get(&proxy).copied().unwrap_or(Address::ZERO))
    }

    async fn code_at(&self, address: Address) -> Result<Vec<u8>> {
        Ok(self.code.get(&address).cloned().unwrap_or_default())
    }
}

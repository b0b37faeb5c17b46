//! This module contains types for dealing with the compiled contract
//! artifacts that the library consumes.
//!
//! Compilation itself is out of scope; artifacts arrive as the JSON documents
//! a Solidity build pipeline writes to its build directory, and only the
//! fields this library needs are deserialized.

use std::{fs, path::Path};

use anyhow::{anyhow, Context};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ast::AstNode, bytecode};

/// The compiled representation of one contract, as produced by the Solidity
/// compiler and written to the build directory.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolcArtifact {
    /// The name of the contract the artifact was compiled from.
    pub contract_name: String,

    /// The path of the source file that declares the contract.
    pub source_path: String,

    /// The contract's application binary interface.
    ///
    /// The ABI is carried opaquely; nothing in this library interprets it.
    #[serde(default)]
    pub abi: serde_json::Value,

    /// The hex-encoded creation bytecode.
    #[serde(default)]
    pub bytecode: String,

    /// The hex-encoded deployed bytecode.
    #[serde(default)]
    pub deployed_bytecode: String,

    /// The root of the contract's syntax tree, spanning the whole source
    /// unit the contract was declared in.
    pub ast: AstNode,
}

impl SolcArtifact {
    /// Decodes the artifact's creation bytecode into bytes.
    pub fn bytecode_bytes(&self) -> anyhow::Result<Vec<u8>> {
        bytecode::decode_hex(&self.bytecode)
            .with_context(|| format!("Invalid creation bytecode for {}", self.contract_name))
    }

    /// Decodes the artifact's deployed bytecode into bytes.
    pub fn deployed_bytecode_bytes(&self) -> anyhow::Result<Vec<u8>> {
        bytecode::decode_hex(&self.deployed_bytecode)
            .with_context(|| format!("Invalid deployed bytecode for {}", self.contract_name))
    }
}

/// The set of compiled artifacts available to one run of the library, keyed
/// by contract name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArtifactSet {
    artifacts: IndexMap<String, SolcArtifact>,
}

impl ArtifactSet {
    /// Constructs an empty artifact set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every `*.json` artifact in the build directory at `path` into a
    /// set.
    ///
    /// When two artifacts declare the same contract name the first one read
    /// wins and the duplicate is dropped with a warning, as the set can hold
    /// only one artifact per name.
    pub fn from_build_dir(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let entries = fs::read_dir(path)
            .map_err(|_| anyhow!("Build directory {} is not readable", path.display()))?;

        let mut set = Self::new();
        for entry in entries {
            let file_path = entry?.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = fs::read(&file_path)
                .with_context(|| format!("Could not read {}", file_path.display()))?;
            let artifact: SolcArtifact = serde_json::from_slice(&contents)
                .with_context(|| format!("Could not parse {}", file_path.display()))?;
            set.insert(artifact);
        }
        Ok(set)
    }

    /// Adds `artifact` to the set, keeping the existing artifact when one
    /// with the same contract name is already present.
    pub fn insert(&mut self, artifact: SolcArtifact) {
        if self.artifacts.contains_key(&artifact.contract_name) {
            warn!(
                contract = %artifact.contract_name,
                path = %artifact.source_path,
                "Dropping duplicate artifact"
            );
            return;
        }
        self.artifacts.insert(artifact.contract_name.clone(), artifact);
    }

    /// Gets the artifact for the contract named `name`, if one is available.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SolcArtifact> {
        self.artifacts.get(name)
    }

    /// Gets the names of all contracts with an artifact in the set.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }

    /// Iterates over the artifacts in the set in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SolcArtifact> {
        self.artifacts.values()
    }

    /// Gets the number of artifacts in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Checks whether the set contains no artifacts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type IntoIter = indexmap::map::Values<'a, String, SolcArtifact>;
    type Item = &'a SolcArtifact;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.values()
    }
}
